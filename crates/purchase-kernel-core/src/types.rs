//! Strong type definitions for the Purchase Kernel.
//!
//! Store-issued identifiers are newtypes so a token can never be passed where
//! an order id or product id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of characters shown when a token is displayed in logs.
const TOKEN_DISPLAY_LEN: usize = 12;

/// Opaque, store-issued identifier of a purchase.
///
/// Required for every acknowledge or consume call. The kernel never interprets
/// its contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PurchaseToken(String);

impl PurchaseToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for PurchaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PurchaseToken({})", self)
    }
}

impl fmt::Display for PurchaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.char_indices().nth(TOKEN_DISPLAY_LEN) {
            Some((idx, _)) => write!(f, "{}...", &self.0[..idx]),
            None => f.write_str(&self.0),
        }
    }
}

impl AsRef<str> for PurchaseToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PurchaseToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PurchaseToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Store-issued order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Wrap a raw order id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the order id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of product is being sold.
///
/// Store-specific wire tokens for these variants live in the gateway adapter;
/// the core only ever sees this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    /// One-time purchase (consumable or not).
    OneTime,
    /// Auto-renewing subscription.
    Subscription,
}

/// Purchase state as reported by the store inside the signed receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseState {
    Purchased,
    Canceled,
    Pending,
}

impl PurchaseState {
    /// Map the numeric receipt field.
    pub fn from_receipt_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Purchased),
            1 => Some(Self::Canceled),
            2 => Some(Self::Pending),
            _ => None,
        }
    }

    /// The numeric receipt field for this state.
    pub fn to_receipt_code(self) -> i64 {
        match self {
            Self::Purchased => 0,
            Self::Canceled => 1,
            Self::Pending => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_display_truncates() {
        let token = PurchaseToken::new("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(format!("{}", token), "abcdefghijkl...");
        assert_eq!(format!("{:?}", token), "PurchaseToken(abcdefghijkl...)");
    }

    #[test]
    fn test_short_token_display() {
        let token = PurchaseToken::new("tok-1");
        assert_eq!(format!("{}", token), "tok-1");
    }

    #[test]
    fn test_purchase_state_codes() {
        for state in [
            PurchaseState::Purchased,
            PurchaseState::Canceled,
            PurchaseState::Pending,
        ] {
            assert_eq!(
                PurchaseState::from_receipt_code(state.to_receipt_code()),
                Some(state)
            );
        }
        assert_eq!(PurchaseState::from_receipt_code(9), None);
    }
}
