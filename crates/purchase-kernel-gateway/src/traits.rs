//! StoreGateway trait: the narrow interface to a third-party store.
//!
//! Implemented by a store-specific adapter. The kernel never speaks the
//! store's protocol itself.

use async_trait::async_trait;
use purchase_kernel_core::{ProductKind, PurchaseToken, RawProduct, RawPurchase};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::response::ResponseCode;

/// Push-style update delivered after a purchase flow, or whenever the store
/// learns about new purchases on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseUpdate {
    /// Result of the flow that produced this update.
    pub code: ResponseCode,
    /// Receipts carried by the update, possibly none.
    pub purchases: Vec<RawPurchase>,
}

/// Events the gateway pushes to the kernel, from a thread of its choosing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A purchase flow finished or the store reported new purchases.
    PurchasesUpdated(PurchaseUpdate),
    /// The store connection dropped.
    Disconnected,
}

/// Sending half handed to [`StoreGateway::open`].
pub type GatewayEvents = mpsc::UnboundedSender<GatewayEvent>;

/// Answer to a catalog query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResponse {
    pub code: ResponseCode,
    pub products: Vec<RawProduct>,
}

/// One page of owned purchases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPurchasesPage {
    pub code: ResponseCode,
    pub purchases: Vec<RawPurchase>,
    /// Set when more pages are available.
    pub continuation_token: Option<String>,
}

/// The StoreGateway trait: async interface to the store.
///
/// # Design Notes
///
/// - **Errors vs codes**: `Err` means the store could not be reached. A store
///   that answered, even negatively, returns `Ok` with its [`ResponseCode`].
/// - **Push delivery**: purchase flow results arrive as
///   [`GatewayEvent::PurchasesUpdated`] on the channel given to `open`, not as
///   return values of `launch_purchase_flow`.
/// - **Idempotent settlement**: acknowledging an already acknowledged token
///   must answer [`ResponseCode::Ok`].
#[async_trait]
pub trait StoreGateway: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Open the store connection. Events are pushed to `events` until `close`.
    async fn open(&self, events: GatewayEvents) -> Result<()>;

    /// Close the connection and drop the event sender.
    async fn close(&self);

    /// Whether the connected store supports a product kind.
    async fn is_feature_supported(&self, kind: ProductKind) -> bool;

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog and purchases
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up catalog entries for `ids`.
    async fn query_catalog(&self, ids: &[String], kind: ProductKind) -> Result<CatalogResponse>;

    /// Start the store's purchase UI.
    ///
    /// The returned code only says whether the flow could start. Its result
    /// is pushed as a [`GatewayEvent::PurchasesUpdated`].
    async fn launch_purchase_flow(&self, product_id: &str, kind: ProductKind)
        -> Result<ResponseCode>;

    /// List purchases the user currently owns, one page at a time.
    async fn query_owned_purchases(
        &self,
        kind: ProductKind,
        continuation_token: Option<&str>,
    ) -> Result<OwnedPurchasesPage>;

    // ─────────────────────────────────────────────────────────────────────────
    // Settlement
    // ─────────────────────────────────────────────────────────────────────────

    /// Acknowledge a non-consumable purchase or subscription.
    async fn acknowledge(&self, token: &PurchaseToken) -> Result<ResponseCode>;

    /// Consume a consumable purchase so it can be bought again.
    async fn consume(&self, token: &PurchaseToken) -> Result<ResponseCode>;
}
