//! # Purchase Kernel Core
//!
//! Pure primitives for the Purchase Kernel: purchases, products, and receipt
//! verification.
//!
//! This crate contains no I/O and no store protocol. It is pure computation
//! over signed receipt data, safe to call concurrently across receipts.
//!
//! ## Key Types
//!
//! - [`Purchase`] - Canonical record of one store transaction
//! - [`RawPurchase`] - Receipt bytes and signature exactly as delivered
//! - [`Product`] - Canonical catalog entry
//! - [`VerificationResult`] - Outcome of checking a receipt signature
//!
//! ## Data flow
//!
//! ```text
//! RawPurchase --normalize_purchase--> Purchase
//!      |                                  |
//!      +-------- verify_receipt <---------+ (product id)
//! ```

pub mod crypto;
pub mod error;
pub mod normalize;
pub mod product;
pub mod purchase;
pub mod types;
pub mod verifier;

pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, Result};
pub use normalize::{normalize_product, normalize_purchase};
pub use product::{Product, RawProduct};
pub use purchase::{Purchase, RawPurchase, ReceiptBuilder};
pub use types::{OrderId, ProductKind, PurchaseState, PurchaseToken};
pub use verifier::{
    is_test_product, verify, verify_receipt, VerificationResult, TEST_PURCHASE_CANCELED,
    TEST_PURCHASE_PREFIX, TEST_PURCHASE_REFUNDED, TEST_PURCHASE_SUCCESS,
    TEST_PURCHASE_UNAVAILABLE,
};
