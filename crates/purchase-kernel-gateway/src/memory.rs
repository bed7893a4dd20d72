//! In-memory implementation of the StoreGateway trait.
//!
//! This is primarily for testing. It behaves like a small store: it keeps a
//! catalog, tracks what the user owns, signs receipts with its own keypair and
//! pushes purchase updates through the event channel. Failure injection hooks
//! let tests simulate an unreachable store, flaky settlement and dropped
//! connections.

use std::collections::BTreeMap;

use async_trait::async_trait;
use purchase_kernel_core::{
    is_test_product, Ed25519PublicKey, Keypair, Product, ProductKind, PurchaseState,
    PurchaseToken, RawProduct, RawPurchase, ReceiptBuilder, TEST_PURCHASE_CANCELED,
    TEST_PURCHASE_REFUNDED, TEST_PURCHASE_UNAVAILABLE,
};
use tokio::sync::Mutex;

use crate::error::{GatewayError, Result};
use crate::response::ResponseCode;
use crate::traits::{
    CatalogResponse, GatewayEvent, GatewayEvents, OwnedPurchasesPage, PurchaseUpdate,
    StoreGateway,
};
use crate::wire::{kind_from_wire, kind_to_wire};

/// What the simulated user does in the next purchase flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowScript {
    /// Pays; a signed receipt is pushed.
    #[default]
    Complete,
    /// Backs out of the store UI.
    Cancel,
    /// Chooses a deferred payment method; a pending receipt is pushed.
    Pending,
    /// Pays, but the pushed receipt is altered after signing.
    Tampered,
}

/// Call counters, for asserting what the kernel asked of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub opens: u32,
    pub closes: u32,
    pub launches: u32,
    pub acknowledges: u32,
    pub consumes: u32,
    pub owned_queries: u32,
}

/// In-memory store.
///
/// All data is lost when the gateway is dropped. Thread-safe via Mutex.
pub struct MemoryGateway {
    inner: Mutex<MemoryGatewayInner>,
}

struct MemoryGatewayInner {
    /// Store signing key.
    keypair: Keypair,
    package_name: String,

    /// Catalog as the store would describe it on the wire.
    catalog: Vec<WireProduct>,

    /// Owned purchases indexed by token.
    owned: BTreeMap<PurchaseToken, OwnedEntry>,

    /// Event sink while open.
    events: Option<GatewayEvents>,

    next_order: u64,
    clock_millis: i64,

    // Failure injection.
    reachable: bool,
    subscriptions_supported: bool,
    page_size: usize,
    settle_failures: u32,
    forced_catalog_code: Option<ResponseCode>,
    next_flow: FlowScript,

    stats: GatewayStats,
}

struct WireProduct {
    product_id: String,
    title: String,
    description: String,
    price: String,
    price_amount_micros: i64,
    price_currency_code: String,
    product_type: &'static str,
}

struct OwnedEntry {
    product_id: String,
    kind: ProductKind,
    order: u64,
    purchase_time: i64,
    state: PurchaseState,
    acknowledged: bool,
}

impl MemoryGateway {
    /// Create an empty store that signs receipts with `keypair`.
    pub fn new(keypair: Keypair) -> Self {
        Self {
            inner: Mutex::new(MemoryGatewayInner {
                keypair,
                package_name: "com.example.app".to_string(),
                catalog: Vec::new(),
                owned: BTreeMap::new(),
                events: None,
                next_order: 1,
                clock_millis: 1_700_000_000_000,
                reachable: true,
                subscriptions_supported: true,
                page_size: 20,
                settle_failures: 0,
                forced_catalog_code: None,
                next_flow: FlowScript::Complete,
                stats: GatewayStats::default(),
            }),
        }
    }

    /// The key developers would configure to verify this store's receipts.
    pub async fn public_key(&self) -> Ed25519PublicKey {
        self.inner.lock().await.keypair.public_key()
    }

    /// Add a product to the catalog.
    pub async fn add_product(&self, product: Product) {
        let mut inner = self.inner.lock().await;
        inner.catalog.retain(|p| p.product_id != product.product_id);
        inner.catalog.push(WireProduct {
            product_id: product.product_id,
            title: product.title,
            description: product.description,
            price: product.formatted_price,
            price_amount_micros: product.price_micros,
            price_currency_code: product.currency_code,
            product_type: kind_to_wire(product.kind),
        });
    }

    /// Record a purchase made outside this session (another device, a
    /// previous install).
    pub async fn grant(&self, product_id: &str, kind: ProductKind, acknowledged: bool) -> PurchaseToken {
        let mut inner = self.inner.lock().await;
        inner.record_purchase(product_id, kind, PurchaseState::Purchased, acknowledged)
    }

    /// Push an arbitrary update, as a store might on its own.
    pub async fn push_update(&self, update: PurchaseUpdate) {
        let inner = self.inner.lock().await;
        inner.emit(GatewayEvent::PurchasesUpdated(update));
    }

    /// Sign a receipt for an owned token, as the store would deliver it.
    pub async fn receipt_for(&self, token: &PurchaseToken) -> Option<RawPurchase> {
        let inner = self.inner.lock().await;
        inner.owned.get(token).map(|entry| inner.sign(token, entry))
    }

    /// Drop the connection from the store side.
    pub async fn simulate_disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.emit(GatewayEvent::Disconnected);
        inner.events = None;
    }

    pub async fn set_reachable(&self, reachable: bool) {
        self.inner.lock().await.reachable = reachable;
    }

    pub async fn set_subscriptions_supported(&self, supported: bool) {
        self.inner.lock().await.subscriptions_supported = supported;
    }

    pub async fn set_page_size(&self, page_size: usize) {
        self.inner.lock().await.page_size = page_size.max(1);
    }

    /// Make the next `count` acknowledge/consume calls fail transiently.
    pub async fn fail_next_settlements(&self, count: u32) {
        self.inner.lock().await.settle_failures = count;
    }

    pub async fn force_catalog_code(&self, code: Option<ResponseCode>) {
        self.inner.lock().await.forced_catalog_code = code;
    }

    pub async fn set_next_flow(&self, flow: FlowScript) {
        self.inner.lock().await.next_flow = flow;
    }

    pub async fn stats(&self) -> GatewayStats {
        self.inner.lock().await.stats
    }

    /// Whether the store considers a token acknowledged. `None` if unknown
    /// or consumed.
    pub async fn is_acknowledged(&self, token: &PurchaseToken) -> Option<bool> {
        self.inner.lock().await.owned.get(token).map(|e| e.acknowledged)
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.events.is_some()
    }
}

impl MemoryGatewayInner {
    fn ensure_reachable(&self) -> Result<()> {
        if !self.reachable {
            return Err(GatewayError::Unavailable("store unreachable".into()));
        }
        if self.events.is_none() {
            return Err(GatewayError::Closed);
        }
        Ok(())
    }

    fn emit(&self, event: GatewayEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                tracing::warn!("gateway event receiver dropped");
            }
        }
    }

    fn record_purchase(
        &mut self,
        product_id: &str,
        kind: ProductKind,
        state: PurchaseState,
        acknowledged: bool,
    ) -> PurchaseToken {
        let order = self.next_order;
        self.next_order += 1;
        self.clock_millis += 1_000;

        let token = PurchaseToken::new(format!("tok-{order:04}-{product_id}"));
        self.owned.insert(
            token.clone(),
            OwnedEntry {
                product_id: product_id.to_string(),
                kind,
                order,
                purchase_time: self.clock_millis,
                state,
                acknowledged,
            },
        );
        token
    }

    fn sign(&self, token: &PurchaseToken, entry: &OwnedEntry) -> RawPurchase {
        ReceiptBuilder::new(entry.product_id.clone(), token.as_str())
            .order_id(format!("GPA.{:04}", entry.order))
            .package_name(self.package_name.clone())
            .purchase_time(entry.purchase_time)
            .state(entry.state)
            .auto_renewing(entry.kind == ProductKind::Subscription)
            .acknowledged(entry.acknowledged)
            .sign(&self.keypair)
    }

    fn owns_unconsumed(&self, product_id: &str) -> bool {
        self.owned
            .values()
            .any(|e| e.product_id == product_id && e.state != PurchaseState::Canceled)
    }

    /// Run a sandbox product flow. Mirrors the store's static responses.
    fn launch_test_product(&mut self, product_id: &str, kind: ProductKind) -> ResponseCode {
        match product_id {
            TEST_PURCHASE_UNAVAILABLE => ResponseCode::ItemUnavailable,
            TEST_PURCHASE_CANCELED => {
                self.emit(GatewayEvent::PurchasesUpdated(PurchaseUpdate {
                    code: ResponseCode::UserCanceled,
                    purchases: Vec::new(),
                }));
                ResponseCode::Ok
            }
            _ => {
                let state = if product_id == TEST_PURCHASE_REFUNDED {
                    PurchaseState::Canceled
                } else {
                    PurchaseState::Purchased
                };
                let token = self.record_purchase(product_id, kind, state, false);
                // Sandbox receipts are not signed with the production key.
                let receipt = self
                    .owned
                    .get(&token)
                    .map(|entry| {
                        ReceiptBuilder::new(entry.product_id.clone(), token.as_str())
                            .order_id(format!("GPA.{:04}", entry.order))
                            .package_name(self.package_name.clone())
                            .purchase_time(entry.purchase_time)
                            .state(entry.state)
                            .unsigned()
                    })
                    .into_iter()
                    .collect();
                self.emit(GatewayEvent::PurchasesUpdated(PurchaseUpdate {
                    code: ResponseCode::Ok,
                    purchases: receipt,
                }));
                ResponseCode::Ok
            }
        }
    }

    fn settle(&mut self, token: &PurchaseToken, consume: bool) -> ResponseCode {
        if self.settle_failures > 0 {
            self.settle_failures -= 1;
            return ResponseCode::ServiceUnavailable;
        }

        if consume {
            match self.owned.remove(token) {
                Some(_) => ResponseCode::Ok,
                None => ResponseCode::ItemNotOwned,
            }
        } else {
            match self.owned.get_mut(token) {
                Some(entry) => {
                    entry.acknowledged = true;
                    ResponseCode::Ok
                }
                None => ResponseCode::ItemNotOwned,
            }
        }
    }
}

#[async_trait]
impl StoreGateway for MemoryGateway {
    async fn open(&self, events: GatewayEvents) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.reachable {
            return Err(GatewayError::Unavailable("store unreachable".into()));
        }
        inner.stats.opens += 1;
        inner.events = Some(events);
        Ok(())
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.stats.closes += 1;
        inner.events = None;
    }

    async fn is_feature_supported(&self, kind: ProductKind) -> bool {
        let inner = self.inner.lock().await;
        match kind {
            ProductKind::OneTime => true,
            ProductKind::Subscription => inner.subscriptions_supported,
        }
    }

    async fn query_catalog(&self, ids: &[String], kind: ProductKind) -> Result<CatalogResponse> {
        let inner = self.inner.lock().await;
        inner.ensure_reachable()?;

        if let Some(code) = inner.forced_catalog_code {
            return Ok(CatalogResponse {
                code,
                products: Vec::new(),
            });
        }

        let wanted = kind_to_wire(kind);
        let products = inner
            .catalog
            .iter()
            .filter(|p| p.product_type == wanted && ids.contains(&p.product_id))
            .map(|p| RawProduct {
                product_id: Some(p.product_id.clone()),
                title: Some(p.title.clone()),
                description: Some(p.description.clone()),
                formatted_price: Some(p.price.clone()),
                price_micros: Some(p.price_amount_micros),
                currency_code: Some(p.price_currency_code.clone()),
                kind: kind_from_wire(p.product_type),
            })
            .collect();

        Ok(CatalogResponse {
            code: ResponseCode::Ok,
            products,
        })
    }

    async fn launch_purchase_flow(
        &self,
        product_id: &str,
        kind: ProductKind,
    ) -> Result<ResponseCode> {
        let mut inner = self.inner.lock().await;
        inner.ensure_reachable()?;
        inner.stats.launches += 1;

        if is_test_product(product_id) {
            return Ok(inner.launch_test_product(product_id, kind));
        }

        let wanted = kind_to_wire(kind);
        if !inner
            .catalog
            .iter()
            .any(|p| p.product_id == product_id && p.product_type == wanted)
        {
            return Ok(ResponseCode::ItemUnavailable);
        }
        if kind == ProductKind::Subscription && !inner.subscriptions_supported {
            return Ok(ResponseCode::FeatureNotSupported);
        }
        if inner.owns_unconsumed(product_id) {
            return Ok(ResponseCode::ItemAlreadyOwned);
        }

        let flow = std::mem::take(&mut inner.next_flow);
        let update = match flow {
            FlowScript::Cancel => PurchaseUpdate {
                code: ResponseCode::UserCanceled,
                purchases: Vec::new(),
            },
            FlowScript::Complete | FlowScript::Pending | FlowScript::Tampered => {
                let state = if flow == FlowScript::Pending {
                    PurchaseState::Pending
                } else {
                    PurchaseState::Purchased
                };
                let token = inner.record_purchase(product_id, kind, state, false);
                let mut receipt = inner
                    .owned
                    .get(&token)
                    .map(|entry| inner.sign(&token, entry))
                    .ok_or_else(|| GatewayError::InvalidResponse("purchase not recorded".into()))?;
                if flow == FlowScript::Tampered {
                    let mut json = receipt.original_json.to_vec();
                    json.extend_from_slice(b" ");
                    receipt.original_json = json.into();
                }
                PurchaseUpdate {
                    code: ResponseCode::Ok,
                    purchases: vec![receipt],
                }
            }
        };

        inner.emit(GatewayEvent::PurchasesUpdated(update));
        Ok(ResponseCode::Ok)
    }

    async fn query_owned_purchases(
        &self,
        kind: ProductKind,
        continuation_token: Option<&str>,
    ) -> Result<OwnedPurchasesPage> {
        let mut inner = self.inner.lock().await;
        inner.ensure_reachable()?;
        inner.stats.owned_queries += 1;

        let start = match continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| GatewayError::InvalidResponse(format!("bad continuation {token}")))?,
            None => 0,
        };

        let matching: Vec<RawPurchase> = inner
            .owned
            .iter()
            .filter(|(_, e)| e.kind == kind && e.state != PurchaseState::Canceled)
            .map(|(token, e)| inner.sign(token, e))
            .collect();

        let end = start.saturating_add(inner.page_size).min(matching.len());
        let purchases = matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let continuation_token = (end < matching.len()).then(|| end.to_string());

        Ok(OwnedPurchasesPage {
            code: ResponseCode::Ok,
            purchases,
            continuation_token,
        })
    }

    async fn acknowledge(&self, token: &PurchaseToken) -> Result<ResponseCode> {
        let mut inner = self.inner.lock().await;
        inner.ensure_reachable()?;
        inner.stats.acknowledges += 1;
        Ok(inner.settle(token, false))
    }

    async fn consume(&self, token: &PurchaseToken) -> Result<ResponseCode> {
        let mut inner = self.inner.lock().await;
        inner.ensure_reachable()?;
        inner.stats.consumes += 1;
        Ok(inner.settle(token, true))
    }
}
