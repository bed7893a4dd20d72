//! Lifecycle manager: turns gateway updates into listener notifications.
//!
//! Every receipt is checked before anything else happens. A verified
//! purchase is folded into the ledger and, if the store still expects it,
//! acknowledged or consumed before success is reported. Work on one token
//! is serialized, so concurrent deliveries of the same purchase settle it
//! once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use purchase_kernel_core::{
    normalize_purchase, verify_receipt, Ed25519PublicKey, ProductKind, Purchase, PurchaseState,
    PurchaseToken, RawPurchase, VerificationResult,
};
use purchase_kernel_gateway::{GatewayError, PurchaseUpdate, ResponseCode, StoreGateway};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::ledger::{LedgerEntry, PurchaseLedger, ReconcileReport};
use crate::state::LifecycleState;

/// Result of a purchase attempt as reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseOutcome {
    /// Verified and settled with the store.
    Success,
    /// The user already owns the product.
    AlreadyOwned,
    /// The receipt was missing or could not be parsed.
    InvalidPurchase,
    /// The receipt signature did not verify.
    InvalidSignature,
    /// The user backed out, or the purchase was canceled.
    UserCanceled,
    /// Payment not yet completed. Do not grant the entitlement.
    Pending,
    /// Verified, but the store would not take the acknowledge/consume call.
    AcknowledgementFailed,
}

/// One notification for the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub outcome: PurchaseOutcome,
    pub purchase: Option<Purchase>,
}

impl Notification {
    pub fn new(outcome: PurchaseOutcome, purchase: Option<Purchase>) -> Self {
        Self { outcome, purchase }
    }
}

/// Which store call settles a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    Acknowledge,
    Consume,
}

impl SettleMode {
    fn states(self) -> (LifecycleState, LifecycleState) {
        match self {
            Self::Acknowledge => (LifecycleState::Acknowledging, LifecycleState::Acknowledged),
            Self::Consume => (LifecycleState::Consuming, LifecycleState::Consumed),
        }
    }
}

/// Outcome of a successful settle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleResult {
    /// The store accepted the call just now.
    Settled,
    /// Nothing to do; the purchase was already settled.
    AlreadySettled,
}

type TokenLocks = StdMutex<HashMap<PurchaseToken, Arc<Mutex<()>>>>;

/// Exclusive hold on one purchase token.
///
/// The token's lock entry is removed when its last holder or waiter goes
/// away.
struct TokenGuard<'a> {
    locks: &'a TokenLocks,
    token: PurchaseToken,
    lock: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this guard.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.token);
        }
    }
}

/// Drives purchases from receipt to settled state.
pub struct LifecycleManager<G: StoreGateway> {
    gateway: Arc<G>,
    public_key: Ed25519PublicKey,
    config: LifecycleConfig,
    ledger: Mutex<PurchaseLedger>,
    token_locks: TokenLocks,
    /// Purchase flows in progress, oldest first.
    flows: Mutex<Vec<(String, ProductKind)>>,
}

impl<G: StoreGateway> LifecycleManager<G> {
    pub fn new(gateway: Arc<G>, public_key: Ed25519PublicKey, config: LifecycleConfig) -> Self {
        Self {
            gateway,
            public_key,
            config,
            ledger: Mutex::new(PurchaseLedger::new()),
            token_locks: StdMutex::new(HashMap::new()),
            flows: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Remember the kind of a flow about to be launched, so its receipt is
    /// filed and settled correctly.
    pub async fn begin_flow(&self, product_id: &str, kind: ProductKind) {
        let mut flows = self.flows.lock().await;
        flows.retain(|(id, _)| id != product_id);
        flows.push((product_id.to_string(), kind));
    }

    /// Forget a flow that never started.
    pub async fn abandon_flow(&self, product_id: &str) {
        self.end_flow(product_id).await;
    }

    async fn end_flow(&self, product_id: &str) -> Option<ProductKind> {
        let mut flows = self.flows.lock().await;
        let index = flows.iter().position(|(id, _)| id == product_id)?;
        Some(flows.remove(index).1)
    }

    /// A status-only update answers the flow launched last; the store shows
    /// one purchase screen at a time.
    async fn end_latest_flow(&self) {
        if let Some((product_id, _)) = self.flows.lock().await.pop() {
            tracing::debug!("purchase flow for {} ended without a receipt", product_id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Updates
    // ─────────────────────────────────────────────────────────────────────────

    /// Process a pushed purchase update.
    ///
    /// Returns the notifications to deliver, in order. A re-delivered
    /// purchase that is already settled yields nothing.
    pub async fn handle_update(&self, update: PurchaseUpdate) -> Vec<Notification> {
        match update.code {
            ResponseCode::Ok if !update.purchases.is_empty() => {
                let mut notifications = Vec::with_capacity(update.purchases.len());
                for raw in &update.purchases {
                    if let Some(notification) = self.process_purchase(raw).await {
                        notifications.push(notification);
                    }
                }
                notifications
            }
            ResponseCode::ItemAlreadyOwned => {
                self.end_latest_flow().await;
                vec![Notification::new(PurchaseOutcome::AlreadyOwned, None)]
            }
            ResponseCode::UserCanceled => {
                self.end_latest_flow().await;
                vec![Notification::new(PurchaseOutcome::UserCanceled, None)]
            }
            code => {
                tracing::warn!("purchase update without usable receipt: {:?}", code);
                self.end_latest_flow().await;
                vec![Notification::new(PurchaseOutcome::InvalidPurchase, None)]
            }
        }
    }

    async fn process_purchase(&self, raw: &RawPurchase) -> Option<Notification> {
        let purchase = match Self::parse(raw) {
            Ok(purchase) => purchase,
            Err(outcome) => return Some(Notification::new(outcome, None)),
        };
        // The receipt ends its product's flow whether or not it verifies.
        let flow_kind = self.end_flow(&purchase.product_id).await;
        if let Err(outcome) = self.check_signature(raw, &purchase) {
            return Some(Notification::new(outcome, None));
        }

        let token = purchase.purchase_token.clone();
        let _guard = self.lock_token(&token).await;
        let kind = match flow_kind {
            Some(kind) => kind,
            None => self.resolve_kind(&purchase).await,
        };

        {
            let mut ledger = self.ledger.lock().await;
            if let Some(existing) = ledger.get(&token) {
                if existing.state.is_terminal() {
                    tracing::debug!(
                        "ignoring re-delivered purchase {} in state {:?}",
                        token,
                        existing.state
                    );
                    return None;
                }
            }
            ledger.merge(purchase.clone(), kind);
        }

        match purchase.state {
            PurchaseState::Pending => {
                tracing::info!("purchase {} is pending", token);
                Some(Notification::new(PurchaseOutcome::Pending, Some(purchase)))
            }
            PurchaseState::Canceled => {
                Some(Notification::new(PurchaseOutcome::UserCanceled, Some(purchase)))
            }
            PurchaseState::Purchased => {
                let mode = self.settle_mode(&purchase.product_id, kind);
                match self.settle_locked(&token, mode).await {
                    Ok(_) => {
                        let settled = self.snapshot(&token).await.unwrap_or(purchase);
                        Some(Notification::new(PurchaseOutcome::Success, Some(settled)))
                    }
                    Err(e) => {
                        tracing::warn!("could not settle purchase {}: {}", token, e);
                        Some(Notification::new(
                            PurchaseOutcome::AcknowledgementFailed,
                            Some(purchase),
                        ))
                    }
                }
            }
        }
    }

    /// Parse and verify a receipt, or say why it is rejected.
    fn authenticate(&self, raw: &RawPurchase) -> std::result::Result<Purchase, PurchaseOutcome> {
        let purchase = Self::parse(raw)?;
        self.check_signature(raw, &purchase)?;
        Ok(purchase)
    }

    fn parse(raw: &RawPurchase) -> std::result::Result<Purchase, PurchaseOutcome> {
        normalize_purchase(raw).map_err(|e| {
            tracing::warn!("rejecting receipt: {}", e);
            PurchaseOutcome::InvalidPurchase
        })
    }

    fn check_signature(
        &self,
        raw: &RawPurchase,
        purchase: &Purchase,
    ) -> std::result::Result<(), PurchaseOutcome> {
        match verify_receipt(raw, &purchase.product_id, &self.public_key) {
            VerificationResult::Valid => Ok(()),
            VerificationResult::TestReceipt if self.config.accept_test_receipts => {
                tracing::debug!("accepting sandbox receipt for {}", purchase.product_id);
                Ok(())
            }
            VerificationResult::TestReceipt => {
                tracing::warn!("sandbox receipt for {} refused", purchase.product_id);
                Err(PurchaseOutcome::InvalidSignature)
            }
            VerificationResult::InvalidSignature => {
                tracing::warn!("bad signature on receipt {}", purchase.purchase_token);
                Err(PurchaseOutcome::InvalidSignature)
            }
            VerificationResult::MissingReceipt => Err(PurchaseOutcome::InvalidPurchase),
        }
    }

    async fn resolve_kind(&self, purchase: &Purchase) -> ProductKind {
        if let Some(entry) = self.ledger.lock().await.get(&purchase.purchase_token) {
            return entry.kind;
        }
        if purchase.auto_renewing {
            ProductKind::Subscription
        } else {
            ProductKind::OneTime
        }
    }

    fn settle_mode(&self, product_id: &str, kind: ProductKind) -> SettleMode {
        if kind == ProductKind::OneTime && self.config.is_consumable(product_id) {
            SettleMode::Consume
        } else {
            SettleMode::Acknowledge
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Restore
    // ─────────────────────────────────────────────────────────────────────────

    /// Union receipts reported by the store into the ledger.
    ///
    /// Receipts that fail verification are counted and dropped. Nothing is
    /// settled here; see [`ReconcileReport::needs_settlement`].
    pub async fn reconcile(&self, raws: Vec<RawPurchase>, kind: ProductKind) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for raw in raws {
            let purchase = match self.authenticate(&raw) {
                Ok(purchase) => purchase,
                Err(_) => {
                    report.rejected += 1;
                    continue;
                }
            };

            let token = purchase.purchase_token.clone();
            let _guard = self.lock_token(&token).await;
            let partial = self
                .ledger
                .lock()
                .await
                .reconcile(std::iter::once(purchase), kind);

            report.added.extend(partial.added);
            report.merged.extend(partial.merged);
            for token in partial.needs_settlement {
                if !report.needs_settlement.contains(&token) {
                    report.needs_settlement.push(token);
                }
            }
        }

        tracing::debug!(
            "reconciled {:?} purchases: {} added, {} merged, {} rejected",
            kind,
            report.added.len(),
            report.merged.len(),
            report.rejected
        );
        report
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settlement
    // ─────────────────────────────────────────────────────────────────────────

    /// Settle a known purchase the way its product calls for.
    pub async fn settle(&self, token: &PurchaseToken) -> Result<SettleResult> {
        let _guard = self.lock_token(token).await;
        let mode = {
            let ledger = self.ledger.lock().await;
            let entry = ledger
                .get(token)
                .ok_or_else(|| LifecycleError::UnknownPurchase(token.clone()))?;
            self.settle_mode(&entry.purchase.product_id, entry.kind)
        };
        self.settle_locked(token, mode).await
    }

    /// Acknowledge a known purchase. A second call is a no-op.
    pub async fn acknowledge(&self, token: &PurchaseToken) -> Result<SettleResult> {
        let _guard = self.lock_token(token).await;
        self.settle_locked(token, SettleMode::Acknowledge).await
    }

    /// Consume a known purchase. A second call is a no-op.
    pub async fn consume(&self, token: &PurchaseToken) -> Result<SettleResult> {
        let _guard = self.lock_token(token).await;
        self.settle_locked(token, SettleMode::Consume).await
    }

    /// Caller must hold the token lock.
    async fn settle_locked(&self, token: &PurchaseToken, mode: SettleMode) -> Result<SettleResult> {
        let (settling, settled) = mode.states();

        let fallback = {
            let mut ledger = self.ledger.lock().await;
            let state = ledger
                .get(token)
                .map(|e| e.state)
                .ok_or_else(|| LifecycleError::UnknownPurchase(token.clone()))?;

            if state == settled
                || (mode == SettleMode::Acknowledge && state == LifecycleState::Consumed)
            {
                return Ok(SettleResult::AlreadySettled);
            }
            if matches!(state, LifecycleState::Pending | LifecycleState::Canceled) {
                return Err(LifecycleError::NotSettleable {
                    token: token.clone(),
                    state,
                });
            }

            // A settling state here was left behind by an aborted call.
            let fallback = if state.is_settling() {
                LifecycleState::Purchased
            } else {
                state
            };
            if state.is_settling() && state != settling {
                ledger.transition(token, fallback)?;
            }
            ledger.transition(token, settling)?;
            fallback
        };

        let attempts = self.config.max_settle_attempts.max(1);
        let mut last_code = ResponseCode::Error;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = match mode {
                SettleMode::Acknowledge => self.gateway.acknowledge(token).await,
                SettleMode::Consume => self.gateway.consume(token).await,
            };

            match result {
                Ok(ResponseCode::Ok) => {
                    self.ledger.lock().await.transition(token, settled)?;
                    tracing::debug!("{:?} {} on attempt {}", mode, token, attempt);
                    return Ok(SettleResult::Settled);
                }
                Ok(code) if code.is_transient() => {
                    tracing::warn!(
                        "{:?} {} failed with {:?} (attempt {}/{})",
                        mode,
                        token,
                        code,
                        attempt,
                        attempts
                    );
                    last_code = code;
                    last_error = None;
                }
                Ok(code) => {
                    self.revert(token, fallback).await;
                    return Err(LifecycleError::SettlementFailed {
                        token: token.clone(),
                        code,
                    });
                }
                Err(GatewayError::Unavailable(reason)) => {
                    tracing::warn!(
                        "{:?} {}: store unavailable: {} (attempt {}/{})",
                        mode,
                        token,
                        reason,
                        attempt,
                        attempts
                    );
                    last_error = Some(GatewayError::Unavailable(reason));
                }
                Err(e) => {
                    self.revert(token, fallback).await;
                    return Err(e.into());
                }
            }

            if attempt < attempts && !self.config.settle_retry_delay().is_zero() {
                tokio::time::sleep(self.config.settle_retry_delay()).await;
            }
        }

        self.revert(token, fallback).await;
        match last_error {
            Some(e) => Err(e.into()),
            None => Err(LifecycleError::SettlementFailed {
                token: token.clone(),
                code: last_code,
            }),
        }
    }

    async fn revert(&self, token: &PurchaseToken, to: LifecycleState) {
        if let Err(e) = self.ledger.lock().await.transition(token, to) {
            tracing::warn!("could not revert {} to {:?}: {}", token, to, e);
        }
    }

    async fn lock_token(&self, token: &PurchaseToken) -> TokenGuard<'_> {
        let lock = {
            let mut locks = self
                .token_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(token.clone()).or_default())
        };
        let mut guard = TokenGuard {
            locks: &self.token_locks,
            token: token.clone(),
            lock,
            held: None,
        };
        guard.held = Some(Arc::clone(&guard.lock).lock_owned().await);
        guard
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Purchases the user currently holds, oldest first.
    ///
    /// Pending, consumed and canceled purchases stay in the ledger but are
    /// left out here; use [`entries`](Self::entries) to see them.
    pub async fn purchases(&self, kind: Option<ProductKind>) -> Vec<Purchase> {
        self.ledger
            .lock()
            .await
            .entries(kind)
            .into_iter()
            .filter(|e| e.state.is_owned())
            .map(|e| e.purchase)
            .collect()
    }

    pub async fn entries(&self, kind: Option<ProductKind>) -> Vec<LedgerEntry> {
        self.ledger.lock().await.entries(kind)
    }

    pub async fn state_of(&self, token: &PurchaseToken) -> Option<LifecycleState> {
        self.ledger.lock().await.get(token).map(|e| e.state)
    }

    pub async fn owns(&self, product_id: &str) -> bool {
        self.ledger.lock().await.owns(product_id)
    }

    async fn snapshot(&self, token: &PurchaseToken) -> Option<Purchase> {
        self.ledger
            .lock()
            .await
            .get(token)
            .map(|e| e.purchase.clone())
    }
}
