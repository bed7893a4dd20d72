//! The billing session: public entry point of the kernel.
//!
//! A session owns at most one store connection. Each connection gets its own
//! event channel and a task that pumps gateway events through the lifecycle
//! manager to the listener. Reconnecting tears the previous connection and its
//! task down before opening the next one.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use purchase_kernel_core::{
    normalize_product, Ed25519PublicKey, Product, ProductKind, Purchase, PurchaseToken,
};
use purchase_kernel_gateway::{GatewayEvent, ResponseCode, StoreGateway};
use purchase_kernel_lifecycle::{LifecycleManager, PurchaseOutcome, SettleResult};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::BillingConfig;
use crate::error::{BillingError, Result};
use crate::listener::BillingListener;

/// Connection flags shared with the event task.
#[derive(Debug, Default)]
struct LinkState {
    connected: AtomicBool,
    generation: AtomicU64,
}

impl LinkState {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

struct Connection {
    listener: Arc<dyn BillingListener>,
    pump: JoinHandle<()>,
}

/// A billing session against one store.
///
/// Provides:
/// - Connection management with a listener for asynchronous results
/// - Catalog lookup
/// - Purchase flows, verified and settled before success is reported
/// - Restore of owned purchases, unioned with what the session already knows
pub struct BillingSession<G: StoreGateway + 'static> {
    gateway: Arc<G>,
    manager: Arc<LifecycleManager<G>>,
    config: BillingConfig,
    connection: Mutex<Option<Connection>>,
    link: Arc<LinkState>,
}

impl<G: StoreGateway + 'static> BillingSession<G> {
    /// Create a session that verifies receipts against `public_key`.
    pub fn new(gateway: Arc<G>, public_key: Ed25519PublicKey, config: BillingConfig) -> Self {
        let manager = Arc::new(LifecycleManager::new(
            Arc::clone(&gateway),
            public_key,
            config.lifecycle.clone(),
        ));
        Self {
            gateway,
            manager,
            config,
            connection: Mutex::new(None),
            link: Arc::new(LinkState::default()),
        }
    }

    /// Create a session from the raw 32-byte verification key.
    pub fn with_key_bytes(gateway: Arc<G>, key: &[u8], config: BillingConfig) -> Result<Self> {
        let public_key = Ed25519PublicKey::from_slice(key)?;
        Ok(Self::new(gateway, public_key, config))
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Open the store connection and report readiness to `listener`.
    ///
    /// Any previous connection is closed first and its pending events are
    /// dropped.
    pub async fn connect(&self, listener: Arc<dyn BillingListener>) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if let Some(previous) = connection.take() {
            self.teardown(previous).await;
        }

        let generation = self.link.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (events, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.gateway.open(events).await {
            tracing::warn!("could not connect to the store: {}", e);
            return Err(e.into());
        }
        self.link.connected.store(true, Ordering::SeqCst);
        tracing::info!("billing session connected (generation {})", generation);

        listener.on_ready();

        let pump = tokio::spawn(run_event_pump(
            rx,
            Arc::clone(&self.manager),
            Arc::clone(&listener),
            Arc::clone(&self.link),
            generation,
        ));
        *connection = Some(Connection { listener, pump });
        Ok(())
    }

    /// Close the store connection. Later calls fail with
    /// [`BillingError::NotConnected`] until `connect` is called again.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(previous) = connection.take() {
            self.teardown(previous).await;
            tracing::info!("billing session disconnected");
        }
    }

    async fn teardown(&self, previous: Connection) {
        self.link.generation.fetch_add(1, Ordering::SeqCst);
        self.link.connected.store(false, Ordering::SeqCst);
        previous.pump.abort();
        self.gateway.close().await;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BillingError::NotConnected)
        }
    }

    async fn listener(&self) -> Result<Arc<dyn BillingListener>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.listener))
            .ok_or(BillingError::NotConnected)
    }

    /// Whether the store supports `kind`. `false` while not connected.
    pub async fn is_billing_supported(&self, kind: ProductKind) -> bool {
        self.is_connected() && self.gateway.is_feature_supported(kind).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up catalog entries.
    ///
    /// A store that answers with a failure code yields an empty list, as does
    /// an empty id set. Entries that cannot be normalized are skipped.
    pub async fn fetch_products<I, S>(&self, ids: I, kind: ProductKind) -> Result<Vec<Product>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_connected()?;

        let ids: Vec<String> = ids
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.gateway.query_catalog(&ids, kind).await?;
        if !response.code.is_ok() {
            tracing::debug!("catalog query answered {:?}", response.code);
            return Ok(Vec::new());
        }

        let mut products = Vec::with_capacity(response.products.len());
        for raw in response.products {
            match normalize_product(raw) {
                Ok(product) => products.push(product),
                Err(e) => tracing::warn!("skipping catalog entry: {}", e),
            }
        }
        Ok(products)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Purchases
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a purchase flow.
    ///
    /// The outcome reaches the listener once the store reports back. A flow
    /// the store refuses to start is reported the same way, except when the
    /// store is temporarily unavailable, which is returned as
    /// [`BillingError::GatewayUnavailable`].
    pub async fn purchase(&self, product_id: &str, kind: ProductKind) -> Result<()> {
        self.ensure_connected()?;
        let listener = self.listener().await?;

        self.manager.begin_flow(product_id, kind).await;
        let code = match self.gateway.launch_purchase_flow(product_id, kind).await {
            Ok(code) => code,
            Err(e) => {
                self.manager.abandon_flow(product_id).await;
                return Err(e.into());
            }
        };
        if code.is_ok() {
            tracing::debug!("purchase flow started for {}", product_id);
            return Ok(());
        }

        self.manager.abandon_flow(product_id).await;
        let outcome = match code {
            ResponseCode::ItemAlreadyOwned => PurchaseOutcome::AlreadyOwned,
            ResponseCode::UserCanceled => PurchaseOutcome::UserCanceled,
            code if code.is_transient() => {
                return Err(BillingError::GatewayUnavailable(format!(
                    "purchase flow refused: {code:?}"
                )));
            }
            code => {
                tracing::warn!("store refused purchase of {}: {:?}", product_id, code);
                PurchaseOutcome::InvalidPurchase
            }
        };
        listener.on_purchase_finished(outcome, None);
        Ok(())
    }

    /// Query what the user owns and fold it into the session.
    ///
    /// Continuation pages are followed up to `max_restore_pages`. Returns
    /// every purchase of `kind` the user still holds, including ones the
    /// store no longer lists. Consumed and pending purchases are not
    /// returned.
    pub async fn restore_purchases(&self, kind: ProductKind) -> Result<Vec<Purchase>> {
        self.ensure_connected()?;

        let mut raws = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self
                .gateway
                .query_owned_purchases(kind, continuation.as_deref())
                .await?;
            pages += 1;

            if !page.code.is_ok() {
                if page.code.is_transient() {
                    return Err(BillingError::GatewayUnavailable(format!(
                        "owned purchases query answered {:?}",
                        page.code
                    )));
                }
                tracing::debug!("owned purchases query answered {:?}", page.code);
                break;
            }

            raws.extend(page.purchases);
            match page.continuation_token {
                Some(next) if pages < self.config.max_restore_pages => continuation = Some(next),
                Some(_) => {
                    tracing::warn!("restore stopped after {} pages; more remain", pages);
                    break;
                }
                None => break,
            }
        }

        let report = self.manager.reconcile(raws, kind).await;
        if self.config.settle_on_restore {
            for token in &report.needs_settlement {
                if let Err(e) = self.manager.settle(token).await {
                    tracing::warn!("could not settle restored purchase {}: {}", token, e);
                }
            }
        }

        Ok(self.manager.purchases(Some(kind)).await)
    }

    /// Snapshot of the purchases the user holds, across kinds.
    pub async fn purchases(&self) -> Vec<Purchase> {
        self.manager.purchases(None).await
    }

    /// Whether the session knows of an owned purchase of `product_id`.
    pub async fn owns(&self, product_id: &str) -> bool {
        self.manager.owns(product_id).await
    }

    /// Acknowledge a known purchase. Acknowledging twice is a no-op.
    pub async fn acknowledge(&self, token: &PurchaseToken) -> Result<SettleResult> {
        self.ensure_connected()?;
        Ok(self.manager.acknowledge(token).await?)
    }

    /// Consume a known purchase so it can be bought again.
    pub async fn consume(&self, token: &PurchaseToken) -> Result<SettleResult> {
        self.ensure_connected()?;
        Ok(self.manager.consume(token).await?)
    }
}

impl<G: StoreGateway + 'static> Drop for BillingSession<G> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.pump.abort();
        }
    }
}

async fn run_event_pump<G: StoreGateway + 'static>(
    mut rx: mpsc::UnboundedReceiver<GatewayEvent>,
    manager: Arc<LifecycleManager<G>>,
    listener: Arc<dyn BillingListener>,
    link: Arc<LinkState>,
    generation: u64,
) {
    while let Some(event) = rx.recv().await {
        if !link.is_current(generation) {
            tracing::warn!("dropping event from stale connection {}", generation);
            break;
        }

        match event {
            GatewayEvent::PurchasesUpdated(update) => {
                for notification in manager.handle_update(update).await {
                    if !link.is_current(generation) {
                        tracing::warn!("connection {} replaced mid-update", generation);
                        return;
                    }
                    listener.on_purchase_finished(notification.outcome, notification.purchase);
                }
            }
            GatewayEvent::Disconnected => {
                link.connected.store(false, Ordering::SeqCst);
                tracing::info!("store dropped connection {}", generation);
                listener.on_disconnected();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purchase_kernel_core::Keypair;
    use purchase_kernel_gateway::MemoryGateway;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingListener {
        ready: AtomicU64,
        outcomes: StdMutex<Vec<PurchaseOutcome>>,
    }

    impl BillingListener for CountingListener {
        fn on_ready(&self) {
            self.ready.fetch_add(1, Ordering::SeqCst);
        }

        fn on_purchase_finished(&self, outcome: PurchaseOutcome, _purchase: Option<Purchase>) {
            self.outcomes.lock().unwrap().push(outcome);
        }
    }

    fn session() -> BillingSession<MemoryGateway> {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let public_key = keypair.public_key();
        let gateway = Arc::new(MemoryGateway::new(keypair));
        BillingSession::new(gateway, public_key, BillingConfig::default())
    }

    #[tokio::test]
    async fn test_calls_before_connect_fail_fast() {
        let session = session();

        assert!(matches!(
            session.fetch_products(["gold"], ProductKind::OneTime).await,
            Err(BillingError::NotConnected)
        ));
        assert!(matches!(
            session.purchase("gold", ProductKind::OneTime).await,
            Err(BillingError::NotConnected)
        ));
        assert!(matches!(
            session.restore_purchases(ProductKind::OneTime).await,
            Err(BillingError::NotConnected)
        ));
        assert!(!session.is_billing_supported(ProductKind::OneTime).await);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_connection() {
        let session = session();
        let counter = Arc::new(CountingListener::default());

        session.connect(counter.clone()).await.unwrap();
        session.connect(counter.clone()).await.unwrap();

        assert_eq!(counter.ready.load(Ordering::SeqCst), 2);
        let stats = session.gateway().stats().await;
        assert_eq!((stats.opens, stats.closes), (2, 1));
        assert!(session.is_connected());
        assert_eq!(session.link.generation.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_connect() {
        let session = session();
        session.gateway().set_reachable(false).await;

        let result = session.connect(Arc::new(CountingListener::default())).await;
        assert!(matches!(result, Err(BillingError::GatewayUnavailable(_))));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_bad_key_bytes() {
        let gateway = Arc::new(MemoryGateway::new(Keypair::generate()));
        let result =
            BillingSession::with_key_bytes(gateway, &[0u8; 5], BillingConfig::default());
        assert!(matches!(result, Err(BillingError::InvalidPublicKey)));
    }

    #[tokio::test]
    async fn test_unavailable_item_reported_to_listener() {
        let session = session();
        let counter = Arc::new(CountingListener::default());
        session.connect(counter.clone()).await.unwrap();

        session.purchase("missing", ProductKind::OneTime).await.unwrap();

        assert_eq!(
            *counter.outcomes.lock().unwrap(),
            vec![PurchaseOutcome::InvalidPurchase]
        );
    }
}
