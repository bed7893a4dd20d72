//! Error types for the billing session.

use purchase_kernel_core::CoreError;
use purchase_kernel_gateway::GatewayError;
use purchase_kernel_lifecycle::LifecycleError;
use thiserror::Error;

/// Errors that can occur during billing session operations.
///
/// Rejected receipts are not errors: they reach the listener as a
/// [`PurchaseOutcome`](purchase_kernel_lifecycle::PurchaseOutcome).
#[derive(Debug, Error)]
pub enum BillingError {
    /// `connect` has not succeeded, or the store dropped the connection.
    #[error("not connected to the store")]
    NotConnected,

    /// The store could not be reached. Worth retrying.
    #[error("store unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("malformed receipt: {0}")]
    MalformedReceipt(String),

    #[error("malformed product: {0}")]
    MalformedProduct(String),

    /// The configured verification key is not a valid Ed25519 key.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Settlement or state error from the lifecycle manager.
    #[error("lifecycle error: {0}")]
    Lifecycle(LifecycleError),
}

impl From<GatewayError> for BillingError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Closed => Self::NotConnected,
            GatewayError::Unavailable(reason) => Self::GatewayUnavailable(reason),
            GatewayError::InvalidResponse(reason) => {
                Self::GatewayUnavailable(format!("invalid response: {reason}"))
            }
        }
    }
}

impl From<LifecycleError> for BillingError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Gateway(e) => e.into(),
            other => Self::Lifecycle(other),
        }
    }
}

impl From<CoreError> for BillingError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::MalformedReceipt(reason) => Self::MalformedReceipt(reason),
            CoreError::MalformedProduct(reason) => Self::MalformedProduct(reason),
            CoreError::InvalidPublicKey => Self::InvalidPublicKey,
            CoreError::InvalidSignature => Self::MalformedReceipt("bad signature encoding".into()),
        }
    }
}

/// Result type for billing session operations.
pub type Result<T> = std::result::Result<T, BillingError>;
