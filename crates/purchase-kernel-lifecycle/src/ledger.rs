//! Local purchase ledger.
//!
//! Holds what this session knows about each purchase, keyed by token. The
//! ledger lives for the session only; persisting it is the host's business.
//!
//! Restore results are unioned into the ledger, never substituted for it: the
//! store may leave out purchases this client already consumed, and those must
//! not be forgotten.

use std::collections::HashMap;

use purchase_kernel_core::{ProductKind, Purchase, PurchaseToken};

use crate::error::{LifecycleError, Result};
use crate::state::LifecycleState;

/// A purchase and where it stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub purchase: Purchase,
    pub kind: ProductKind,
    pub state: LifecycleState,
}

/// What happened to a purchase folded into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    /// First time this token was seen.
    Added,
    /// Known token; fields refreshed, state kept or advanced.
    Merged,
}

/// Summary of a restore reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tokens seen for the first time.
    pub added: Vec<PurchaseToken>,
    /// Tokens already known locally.
    pub merged: Vec<PurchaseToken>,
    /// Receipts dropped because they were malformed or failed verification.
    pub rejected: usize,
    /// Tokens the store still expects an acknowledge or consume call for.
    pub needs_settlement: Vec<PurchaseToken>,
}

/// Purchases known to the session.
#[derive(Debug, Default)]
pub struct PurchaseLedger {
    entries: HashMap<PurchaseToken, LedgerEntry>,
}

impl PurchaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &PurchaseToken) -> Option<&LedgerEntry> {
        self.entries.get(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a verified purchase into the ledger.
    ///
    /// A known token keeps its state unless the store reports progress; its
    /// `acknowledged` flag is never cleared.
    pub fn merge(&mut self, purchase: Purchase, kind: ProductKind) -> MergeResult {
        let reported = LifecycleState::from_purchase(&purchase);

        match self.entries.get_mut(&purchase.purchase_token) {
            Some(entry) => {
                let acknowledged = entry.purchase.acknowledged || purchase.acknowledged;
                entry.state = entry.state.merge(reported);
                entry.purchase = purchase;
                entry.purchase.acknowledged = acknowledged;
                MergeResult::Merged
            }
            None => {
                self.entries.insert(
                    purchase.purchase_token.clone(),
                    LedgerEntry {
                        purchase,
                        kind,
                        state: reported,
                    },
                );
                MergeResult::Added
            }
        }
    }

    /// Union a batch of verified purchases into the ledger.
    pub fn reconcile(
        &mut self,
        purchases: impl IntoIterator<Item = Purchase>,
        kind: ProductKind,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for purchase in purchases {
            let token = purchase.purchase_token.clone();
            match self.merge(purchase, kind) {
                MergeResult::Added => report.added.push(token.clone()),
                MergeResult::Merged => report.merged.push(token.clone()),
            }
            if self.needs_settlement(&token) && !report.needs_settlement.contains(&token) {
                report.needs_settlement.push(token);
            }
        }

        report
    }

    /// Whether the store still expects an acknowledge or consume call.
    pub fn needs_settlement(&self, token: &PurchaseToken) -> bool {
        self.entries.get(token).is_some_and(|e| {
            matches!(e.state, LifecycleState::Purchased)
                || (e.state.is_settling() && !e.purchase.acknowledged)
        })
    }

    /// Apply a checked state transition.
    pub fn transition(
        &mut self,
        token: &PurchaseToken,
        to: LifecycleState,
    ) -> Result<LifecycleState> {
        let entry = self
            .entries
            .get_mut(token)
            .ok_or_else(|| LifecycleError::UnknownPurchase(token.clone()))?;

        entry.state = entry.state.transition(to)?;
        if matches!(to, LifecycleState::Acknowledged | LifecycleState::Consumed) {
            entry.purchase.acknowledged = true;
        }
        Ok(entry.state)
    }

    /// Whether any purchase of `product_id` is currently owned.
    pub fn owns(&self, product_id: &str) -> bool {
        self.entries
            .values()
            .any(|e| e.purchase.product_id == product_id && e.state.is_owned())
    }

    /// All known entries of a kind, oldest first.
    pub fn entries(&self, kind: Option<ProductKind>) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .values()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.purchase
                .purchase_time_millis
                .cmp(&b.purchase.purchase_time_millis)
                .then_with(|| a.purchase.purchase_token.cmp(&b.purchase.purchase_token))
        });
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use purchase_kernel_core::{normalize_purchase, Keypair, ReceiptBuilder};

    fn purchase(product_id: &str, token: &str, acknowledged: bool) -> Purchase {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let raw = ReceiptBuilder::new(product_id, token)
            .acknowledged(acknowledged)
            .sign(&keypair);
        normalize_purchase(&raw).unwrap()
    }

    #[test]
    fn test_restore_union() {
        let mut ledger = PurchaseLedger::new();
        let a = purchase("a", "tok-a", false);
        ledger.merge(a.clone(), ProductKind::OneTime);
        ledger
            .transition(&a.purchase_token, LifecycleState::Acknowledging)
            .unwrap();
        ledger
            .transition(&a.purchase_token, LifecycleState::Acknowledged)
            .unwrap();

        // The store still reports A as unacknowledged in this page.
        let report = ledger.reconcile(
            vec![purchase("a", "tok-a", false), purchase("b", "tok-b", false)],
            ProductKind::OneTime,
        );

        assert_eq!(report.added, vec![PurchaseToken::from("tok-b")]);
        assert_eq!(report.merged, vec![PurchaseToken::from("tok-a")]);
        assert_eq!(report.needs_settlement, vec![PurchaseToken::from("tok-b")]);

        let a = ledger.get(&"tok-a".into()).unwrap();
        assert_eq!(a.state, LifecycleState::Acknowledged);
        assert!(a.purchase.acknowledged);

        let b = ledger.get(&"tok-b".into()).unwrap();
        assert_eq!(b.state, LifecycleState::Purchased);
        assert!(!b.purchase.acknowledged);
    }

    #[test]
    fn test_restore_keeps_consumed_items_the_store_omits() {
        let mut ledger = PurchaseLedger::new();
        let coins = purchase("coins", "tok-c", false);
        ledger.merge(coins.clone(), ProductKind::OneTime);
        ledger
            .transition(&coins.purchase_token, LifecycleState::Consuming)
            .unwrap();
        ledger
            .transition(&coins.purchase_token, LifecycleState::Consumed)
            .unwrap();

        ledger.reconcile(vec![purchase("b", "tok-b", true)], ProductKind::OneTime);

        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.get(&"tok-c".into()).unwrap().state,
            LifecycleState::Consumed
        );
        assert_eq!(
            ledger.get(&"tok-b".into()).unwrap().state,
            LifecycleState::Acknowledged
        );
    }

    #[test]
    fn test_transition_unknown_token() {
        let mut ledger = PurchaseLedger::new();
        let result = ledger.transition(&"nope".into(), LifecycleState::Acknowledged);
        assert!(matches!(result, Err(LifecycleError::UnknownPurchase(_))));
    }

    #[test]
    fn test_entries_filtered_and_sorted() {
        let mut ledger = PurchaseLedger::new();
        let mut late = purchase("a", "tok-2", true);
        late.purchase_time_millis = 20;
        let mut early = purchase("b", "tok-1", true);
        early.purchase_time_millis = 10;
        ledger.merge(late, ProductKind::OneTime);
        ledger.merge(early, ProductKind::OneTime);
        ledger.merge(purchase("s", "tok-3", true), ProductKind::Subscription);

        let one_time = ledger.entries(Some(ProductKind::OneTime));
        let tokens: Vec<_> = one_time.iter().map(|e| e.purchase.purchase_token.as_str()).collect();
        assert_eq!(tokens, vec!["tok-1", "tok-2"]);
        assert_eq!(ledger.entries(None).len(), 3);
    }

    proptest! {
        #[test]
        fn reconcile_is_a_union(
            local in prop::collection::btree_set("[a-f]", 0..5),
            remote in prop::collection::btree_set("[a-f]", 0..5),
        ) {
            let mut ledger = PurchaseLedger::new();
            for id in &local {
                ledger.merge(purchase(id, &format!("tok-{id}"), true), ProductKind::OneTime);
            }
            ledger.reconcile(
                remote.iter().map(|id| purchase(id, &format!("tok-{id}"), false)),
                ProductKind::OneTime,
            );

            prop_assert_eq!(ledger.len(), local.union(&remote).count());
            for id in &local {
                let entry = ledger.get(&PurchaseToken::new(format!("tok-{id}"))).unwrap();
                prop_assert_eq!(entry.state, LifecycleState::Acknowledged);
                prop_assert!(entry.purchase.acknowledged);
            }
        }
    }
}
