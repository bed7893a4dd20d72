//! Error types for the lifecycle module.

use purchase_kernel_core::PurchaseToken;
use purchase_kernel_gateway::{GatewayError, ResponseCode};
use thiserror::Error;

use crate::state::LifecycleState;

/// Errors that can occur while driving a purchase through its lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No purchase with this token is known locally.
    #[error("unknown purchase: {0}")]
    UnknownPurchase(PurchaseToken),

    /// The state machine does not allow this move.
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The purchase is pending or canceled and cannot be settled.
    #[error("purchase {token} cannot be settled in state {state:?}")]
    NotSettleable {
        token: PurchaseToken,
        state: LifecycleState,
    },

    /// The store refused or kept failing the acknowledge/consume call.
    #[error("settlement of {token} failed with {code:?}")]
    SettlementFailed {
        token: PurchaseToken,
        code: ResponseCode,
    },

    /// The store could not be reached.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
