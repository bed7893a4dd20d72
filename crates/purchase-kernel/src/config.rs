//! Session configuration.

use purchase_kernel_lifecycle::LifecycleConfig;
use serde::Deserialize;

/// Configuration for a [`BillingSession`](crate::BillingSession).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Verification and settlement settings.
    pub lifecycle: LifecycleConfig,
    /// Upper bound on continuation pages followed by one restore.
    pub max_restore_pages: usize,
    /// Settle purchases a restore finds unacknowledged.
    pub settle_on_restore: bool,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig::default(),
            max_restore_pages: 64,
            settle_on_restore: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: BillingConfig = serde_json::from_str(
            r#"{
                "max_restore_pages": 4,
                "lifecycle": { "accept_test_receipts": false, "consumables": ["coins"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_restore_pages, 4);
        assert!(config.settle_on_restore);
        assert!(!config.lifecycle.accept_test_receipts);
        assert!(config.lifecycle.is_consumable("coins"));
        assert_eq!(config.lifecycle.max_settle_attempts, 3);
        assert_eq!(config.lifecycle.settle_retry_delay_ms, 250);
    }
}
