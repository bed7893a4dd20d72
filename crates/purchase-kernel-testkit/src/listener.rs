//! A listener that records everything it is told.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use purchase_kernel::BillingListener;
use purchase_kernel_core::Purchase;
use purchase_kernel_lifecycle::PurchaseOutcome;
use tokio::sync::mpsc;

/// How long the `next_*` helpers wait before giving up.
pub const WAIT: Duration = Duration::from_secs(5);

/// One listener callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Ready,
    PurchaseFinished(PurchaseOutcome, Option<Purchase>),
    Disconnected,
}

/// Records listener callbacks and lets tests await them.
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    tx: mpsc::UnboundedSender<ListenerEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    fn record(&self, event: ListenerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        let _ = self.tx.send(event);
    }

    /// Every callback so far, in order.
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every purchase outcome so far, in order.
    pub fn outcomes(&self) -> Vec<PurchaseOutcome> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListenerEvent::PurchaseFinished(outcome, _) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    /// Wait for the next callback not yet returned by a `next_*` helper.
    pub async fn next_event(&self) -> Option<ListenerEvent> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
    }

    /// Wait for the next purchase outcome, skipping other callbacks.
    pub async fn next_outcome(&self) -> Option<(PurchaseOutcome, Option<Purchase>)> {
        loop {
            match self.next_event().await? {
                ListenerEvent::PurchaseFinished(outcome, purchase) => {
                    return Some((outcome, purchase))
                }
                _ => continue,
            }
        }
    }

    /// Wait until the store-side disconnect has been reported.
    pub async fn wait_disconnected(&self) -> bool {
        while let Some(event) = self.next_event().await {
            if event == ListenerEvent::Disconnected {
                return true;
            }
        }
        false
    }
}

impl BillingListener for RecordingListener {
    fn on_ready(&self) {
        self.record(ListenerEvent::Ready);
    }

    fn on_purchase_finished(&self, outcome: PurchaseOutcome, purchase: Option<Purchase>) {
        self.record(ListenerEvent::PurchaseFinished(outcome, purchase));
    }

    fn on_disconnected(&self) {
        self.record(ListenerEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_order() {
        let listener = RecordingListener::new();
        listener.on_ready();
        listener.on_purchase_finished(PurchaseOutcome::UserCanceled, None);

        assert_eq!(listener.next_event().await, Some(ListenerEvent::Ready));
        assert_eq!(
            listener.next_outcome().await,
            Some((PurchaseOutcome::UserCanceled, None))
        );
        assert_eq!(listener.outcomes(), vec![PurchaseOutcome::UserCanceled]);
    }
}
