//! # Purchase Kernel Lifecycle
//!
//! Per-purchase state machine, the session ledger, and the manager that turns
//! store updates into settled purchases.
//!
//! ## Key Types
//!
//! - [`LifecycleManager`] - Verifies, files and settles incoming receipts
//! - [`LifecycleState`] - Where a purchase stands locally
//! - [`PurchaseLedger`] - Purchases known to the session, keyed by token
//! - [`PurchaseOutcome`] - What the listener is told about an attempt
//!
//! ## Guarantees
//!
//! - A purchase is reported as [`PurchaseOutcome::Success`] only after its
//!   signature verified and the store accepted the acknowledge/consume call
//! - Settling an already settled purchase makes no store call
//! - A restore only ever adds to the ledger or advances states

pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod state;

pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use ledger::{LedgerEntry, MergeResult, PurchaseLedger, ReconcileReport};
pub use manager::{LifecycleManager, Notification, PurchaseOutcome, SettleMode, SettleResult};
pub use state::LifecycleState;
