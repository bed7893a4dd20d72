//! Lifecycle configuration.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Attempts per acknowledge/consume call before giving up on a transient
    /// store failure.
    pub max_settle_attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub settle_retry_delay_ms: u64,
    /// Accept receipts for the store's reserved sandbox products. Turn off in
    /// production builds.
    pub accept_test_receipts: bool,
    /// Product ids settled by consuming instead of acknowledging.
    pub consumables: HashSet<String>,
}

impl LifecycleConfig {
    pub fn settle_retry_delay(&self) -> Duration {
        Duration::from_millis(self.settle_retry_delay_ms)
    }

    pub fn is_consumable(&self, product_id: &str) -> bool {
        self.consumables.contains(product_id)
    }

    /// Mark a product as consumable.
    pub fn with_consumable(mut self, product_id: impl Into<String>) -> Self {
        self.consumables.insert(product_id.into());
        self
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_settle_attempts: 3,
            settle_retry_delay_ms: 250,
            accept_test_receipts: true,
            consumables: HashSet::new(),
        }
    }
}
