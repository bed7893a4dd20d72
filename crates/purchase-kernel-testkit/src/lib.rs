//! # Purchase Kernel Testkit
//!
//! Testing utilities for the Purchase Kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a stocked in-memory store and ready-made sessions
//! - **Recording listener**: captures listener callbacks and lets tests await them
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use purchase_kernel_core::ProductKind;
//! use purchase_kernel_testkit::TestStore;
//!
//! async fn example() {
//!     let store = TestStore::new().await;
//!     let (session, listener) = store.connected().await;
//!
//!     session.purchase("gold", ProductKind::OneTime).await.unwrap();
//!     let (outcome, purchase) = listener.next_outcome().await.unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use purchase_kernel_testkit::generators::{receipt_from_params, ReceiptParams};
//!
//! proptest! {
//!     #[test]
//!     fn signing_is_deterministic(params: ReceiptParams) {
//!         prop_assert_eq!(receipt_from_params(&params), receipt_from_params(&params));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod listener;

pub use fixtures::{coins, gold, init_tracing, premium, receipt_without, test_config, TestStore};
pub use generators::{receipt_from_params, ReceiptParams};
pub use listener::{ListenerEvent, RecordingListener};
