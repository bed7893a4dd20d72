//! # Purchase Kernel
//!
//! Sell digital goods through a third-party store and trust its receipts.
//!
//! ## Overview
//!
//! The kernel sits between an application and a store adapter:
//!
//! - **Verification**: every receipt's Ed25519 signature is checked over the
//!   exact bytes the store delivered
//! - **Lifecycle**: each purchase is tracked until it is acknowledged or
//!   consumed, so it is never granted twice or silently lost
//! - **Restore**: owned purchases reported by the store are unioned with what
//!   the session already knows
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use purchase_kernel::{BillingConfig, BillingListener, BillingSession, PurchaseOutcome};
//! use purchase_kernel::core::{Keypair, ProductKind, Purchase};
//! use purchase_kernel::gateway::MemoryGateway;
//!
//! struct Shop;
//!
//! impl BillingListener for Shop {
//!     fn on_ready(&self) {}
//!
//!     fn on_purchase_finished(&self, outcome: PurchaseOutcome, purchase: Option<Purchase>) {
//!         if outcome == PurchaseOutcome::Success {
//!             // grant the entitlement for `purchase`
//!         }
//!     }
//! }
//!
//! async fn example() {
//!     let store_key = Keypair::generate();
//!     let public_key = store_key.public_key();
//!     let gateway = Arc::new(MemoryGateway::new(store_key));
//!
//!     let session = BillingSession::new(gateway, public_key, BillingConfig::default());
//!     session.connect(Arc::new(Shop)).await.unwrap();
//!
//!     let products = session
//!         .fetch_products(["gold"], ProductKind::OneTime)
//!         .await
//!         .unwrap();
//!     session.purchase("gold", ProductKind::OneTime).await.unwrap();
//!
//!     let owned = session.restore_purchases(ProductKind::OneTime).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `purchase_kernel::core` - Data model and receipt verification
//! - `purchase_kernel::gateway` - Store gateway trait and in-memory store
//! - `purchase_kernel::lifecycle` - Purchase state machine and ledger

pub mod config;
pub mod error;
pub mod listener;
pub mod session;

// Re-export component crates
pub use purchase_kernel_core as core;
pub use purchase_kernel_gateway as gateway;
pub use purchase_kernel_lifecycle as lifecycle;

// Re-export main types for convenience
pub use config::BillingConfig;
pub use error::{BillingError, Result};
pub use listener::BillingListener;
pub use session::BillingSession;

pub use purchase_kernel_core::{
    verify, Ed25519PublicKey, Product, ProductKind, Purchase, PurchaseState, PurchaseToken,
    RawPurchase, VerificationResult,
};
pub use purchase_kernel_gateway::{ResponseCode, StoreGateway};
pub use purchase_kernel_lifecycle::{LifecycleConfig, LifecycleState, PurchaseOutcome, SettleResult};
