//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use purchase_kernel::{BillingConfig, BillingSession};
use purchase_kernel_core::{
    Ed25519PublicKey, Keypair, Product, ProductKind, RawPurchase, ReceiptBuilder,
};
use purchase_kernel_gateway::MemoryGateway;
use purchase_kernel_lifecycle::LifecycleConfig;

use crate::listener::RecordingListener;

/// Seed of the fixture store's signing key.
pub const STORE_SEED: [u8; 32] = [0x5a; 32];

/// Non-consumable one-time product.
pub fn gold() -> Product {
    product("gold", "Gold", 990_000, ProductKind::OneTime)
}

/// Consumable one-time product, see [`test_config`].
pub fn coins() -> Product {
    product("coins", "100 coins", 1_990_000, ProductKind::OneTime)
}

/// Monthly subscription.
pub fn premium() -> Product {
    product("premium", "Premium", 4_990_000, ProductKind::Subscription)
}

fn product(product_id: &str, title: &str, price_micros: i64, kind: ProductKind) -> Product {
    Product {
        product_id: product_id.to_string(),
        title: title.to_string(),
        description: format!("{title} for tests"),
        formatted_price: format!("${}.{:02}", price_micros / 1_000_000, price_micros / 10_000 % 100),
        price_micros,
        currency_code: "USD".to_string(),
        kind,
    }
}

/// Session config with `coins` consumable and no retry delay.
pub fn test_config() -> BillingConfig {
    BillingConfig {
        lifecycle: LifecycleConfig {
            settle_retry_delay_ms: 0,
            ..LifecycleConfig::default()
        }
        .with_consumable("coins"),
        ..BillingConfig::default()
    }
}

/// Install a tracing subscriber that writes through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A fixture store: signing key plus an in-memory gateway stocked with
/// [`gold`], [`coins`] and [`premium`].
pub struct TestStore {
    pub keypair: Keypair,
    pub gateway: Arc<MemoryGateway>,
}

impl TestStore {
    /// Create a store with the deterministic [`STORE_SEED`] key.
    pub async fn new() -> Self {
        Self::with_seed(STORE_SEED).await
    }

    pub async fn with_seed(seed: [u8; 32]) -> Self {
        let gateway = Arc::new(MemoryGateway::new(Keypair::from_seed(&seed)));
        for product in [gold(), coins(), premium()] {
            gateway.add_product(product).await;
        }
        Self {
            keypair: Keypair::from_seed(&seed),
            gateway,
        }
    }

    /// The key a client verifies this store's receipts with.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Sign a receipt with the store key.
    pub fn sign(&self, receipt: ReceiptBuilder) -> RawPurchase {
        receipt.sign(&self.keypair)
    }

    /// A session over this store. Not connected yet.
    pub fn session(&self, config: BillingConfig) -> BillingSession<MemoryGateway> {
        BillingSession::new(Arc::clone(&self.gateway), self.public_key(), config)
    }

    /// A session with [`test_config`], connected to a fresh recording listener.
    pub async fn connected(&self) -> (BillingSession<MemoryGateway>, Arc<RecordingListener>) {
        let session = self.session(test_config());
        let listener = RecordingListener::new();
        if let Err(e) = session.connect(listener.clone()).await {
            panic!("fixture store refused connection: {e}");
        }
        (session, listener)
    }
}

/// Receipt JSON with one top-level key removed, signed by `keypair`.
///
/// Signed so that the missing field, not the signature, is what a verifier
/// trips over.
pub fn receipt_without(keypair: &Keypair, field: &str) -> RawPurchase {
    let json = ReceiptBuilder::new("gold", "tok-partial").to_json();
    let mut value: serde_json::Value = match serde_json::from_slice(&json) {
        Ok(value) => value,
        Err(e) => panic!("receipt builder produced invalid JSON: {e}"),
    };
    if let Some(fields) = value.as_object_mut() {
        fields.remove(field);
    }
    let bytes = value.to_string().into_bytes();
    let signature = keypair.sign(&bytes);
    RawPurchase::new(bytes, signature.as_bytes().to_vec())
}
