//! Error types for the gateway module.

use thiserror::Error;

/// Transport-level failures talking to the store.
///
/// A store that answers with a non-success [`ResponseCode`](crate::ResponseCode)
/// is not an error at this level; only failing to reach it is.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The gateway connection is not open.
    #[error("gateway connection closed")]
    Closed,

    /// The store answered with something the adapter could not interpret.
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
