//! Error types for the Purchase Kernel Core.

use thiserror::Error;

/// Core errors raised while turning store data into canonical records.
///
/// A failed signature check is deliberately absent from the normalizer paths:
/// the verifier reports it as a [`VerificationResult`](crate::VerificationResult)
/// value, never as an error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed receipt: {0}")]
    MalformedReceipt(String),

    #[error("malformed product: {0}")]
    MalformedProduct(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
