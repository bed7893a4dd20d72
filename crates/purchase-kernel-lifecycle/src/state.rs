//! Per-purchase lifecycle state machine.
//!
//! ```text
//! Pending -> Purchased -> Acknowledging -> Acknowledged
//!                      -> Consuming     -> Consumed
//! Pending | Purchased -> Canceled
//! ```
//!
//! `Acknowledging` and `Consuming` fall back to the state they started from
//! when the store call fails. An `Acknowledged` one-time purchase may still be
//! consumed explicitly; otherwise `Acknowledged`, `Consumed` and `Canceled`
//! are final.

use purchase_kernel_core::{Purchase, PurchaseState};
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};

/// Where a purchase stands locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    Purchased,
    Acknowledging,
    Acknowledged,
    Consuming,
    Consumed,
    Canceled,
}

impl LifecycleState {
    /// Initial state for a freshly verified purchase.
    pub fn from_purchase(purchase: &Purchase) -> Self {
        match purchase.state {
            PurchaseState::Pending => Self::Pending,
            PurchaseState::Canceled => Self::Canceled,
            PurchaseState::Purchased if purchase.acknowledged => Self::Acknowledged,
            PurchaseState::Purchased => Self::Purchased,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::Consumed | Self::Canceled)
    }

    /// Acknowledge or consume call in flight.
    pub fn is_settling(self) -> bool {
        matches!(self, Self::Acknowledging | Self::Consuming)
    }

    /// Whether the user holds the entitlement (granted or about to be).
    pub fn is_owned(self) -> bool {
        matches!(
            self,
            Self::Purchased | Self::Acknowledging | Self::Acknowledged | Self::Consuming
        )
    }

    /// Check whether `self -> to` is allowed.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::*;

        if self == to {
            return true;
        }

        matches!(
            (self, to),
            (Pending, Purchased)
                | (Pending, Canceled)
                | (Purchased, Acknowledging)
                | (Purchased, Acknowledged)
                | (Purchased, Consuming)
                | (Purchased, Canceled)
                | (Acknowledging, Acknowledged)
                | (Acknowledging, Purchased)
                | (Consuming, Consumed)
                | (Consuming, Purchased)
                | (Consuming, Acknowledged)
                | (Acknowledged, Consuming)
        )
    }

    /// Move to `to`, or fail with [`LifecycleError::InvalidTransition`].
    pub fn transition(self, to: LifecycleState) -> Result<LifecycleState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(LifecycleError::InvalidTransition { from: self, to })
        }
    }

    /// Fold what the store now reports into the local state without ever
    /// moving backwards.
    pub fn merge(self, reported: LifecycleState) -> LifecycleState {
        use LifecycleState::*;

        match (self, reported) {
            (Consumed | Canceled, _) => self,
            (Acknowledged, _) => self,
            (_, Canceled) if self.can_transition(Canceled) => Canceled,
            (Pending, Purchased | Acknowledged) => reported,
            (Purchased | Acknowledging, Acknowledged) => Acknowledged,
            _ => self,
        }
    }
}
