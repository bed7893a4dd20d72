//! Caller-supplied observer for asynchronous session results.

use purchase_kernel_core::Purchase;
use purchase_kernel_lifecycle::PurchaseOutcome;

/// Receives session events.
///
/// Methods are called from the session's event task, not from the thread that
/// started the operation. Each purchase attempt is reported once.
pub trait BillingListener: Send + Sync {
    /// The store connection is up.
    fn on_ready(&self);

    /// A purchase attempt reached its final outcome. `purchase` is set when a
    /// receipt was parsed and verified.
    fn on_purchase_finished(&self, outcome: PurchaseOutcome, purchase: Option<Purchase>);

    /// The store dropped the connection. Call `connect` again to resume.
    fn on_disconnected(&self) {}
}
