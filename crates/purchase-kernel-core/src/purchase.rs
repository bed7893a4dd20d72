//! Purchase: a single store transaction.
//!
//! A purchase arrives as a [`RawPurchase`], the exact receipt bytes and
//! signature handed over by the store. Normalizing it yields a [`Purchase`],
//! which keeps the original bytes alongside the parsed fields so the
//! signature can always be re-checked against what the store actually signed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::{Ed25519Signature, Keypair};
use crate::types::{OrderId, PurchaseState, PurchaseToken};

/// Receipt as delivered by the store, untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPurchase {
    /// The signed receipt bytes. Must never be re-serialized.
    pub original_json: Bytes,

    /// Signature over `original_json`.
    pub signature: Bytes,
}

impl RawPurchase {
    /// Wrap receipt bytes and signature as received.
    pub fn new(original_json: impl Into<Bytes>, signature: impl Into<Bytes>) -> Self {
        Self {
            original_json: original_json.into(),
            signature: signature.into(),
        }
    }
}

/// Canonical purchase record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub order_id: OrderId,
    pub product_id: String,
    /// Epoch milliseconds.
    pub purchase_time_millis: i64,
    pub purchase_token: PurchaseToken,
    pub state: PurchaseState,
    pub package_name: String,
    /// Developer-supplied context echoed back by the store.
    pub payload: String,
    pub auto_renewing: bool,
    pub acknowledged: bool,
    pub signature: Bytes,
    /// The exact bytes that were signed.
    pub raw_payload: Bytes,
}

impl Purchase {
    /// Whether the store still expects an acknowledge or consume call.
    pub fn needs_settlement(&self) -> bool {
        self.state == PurchaseState::Purchased && !self.acknowledged
    }

    /// Recover the raw form this purchase was normalized from.
    pub fn to_raw(&self) -> RawPurchase {
        RawPurchase {
            original_json: self.raw_payload.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// Wire shape of a receipt, as serialized by [`ReceiptBuilder`].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptJson<'a> {
    order_id: &'a str,
    package_name: &'a str,
    product_id: &'a str,
    purchase_time: i64,
    purchase_state: i64,
    purchase_token: &'a str,
    developer_payload: &'a str,
    auto_renewing: bool,
    acknowledged: bool,
}

/// Builder for signed receipts.
///
/// Produces the same byte layout a store would deliver. Used by in-memory
/// gateways and tests.
pub struct ReceiptBuilder {
    order_id: String,
    package_name: String,
    product_id: String,
    purchase_time: i64,
    state: PurchaseState,
    purchase_token: String,
    developer_payload: String,
    auto_renewing: bool,
    acknowledged: bool,
}

impl ReceiptBuilder {
    /// Start building a receipt for a product.
    pub fn new(product_id: impl Into<String>, purchase_token: impl Into<String>) -> Self {
        let product_id = product_id.into();
        let purchase_token = purchase_token.into();
        Self {
            order_id: format!("GPA.{}", purchase_token),
            package_name: "com.example.app".to_string(),
            product_id,
            purchase_time: 0,
            state: PurchaseState::Purchased,
            purchase_token,
            developer_payload: String::new(),
            auto_renewing: false,
            acknowledged: false,
        }
    }

    pub fn order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = order_id.into();
        self
    }

    pub fn package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    pub fn purchase_time(mut self, millis: i64) -> Self {
        self.purchase_time = millis;
        self
    }

    pub fn state(mut self, state: PurchaseState) -> Self {
        self.state = state;
        self
    }

    pub fn developer_payload(mut self, payload: impl Into<String>) -> Self {
        self.developer_payload = payload.into();
        self
    }

    pub fn auto_renewing(mut self, auto_renewing: bool) -> Self {
        self.auto_renewing = auto_renewing;
        self
    }

    pub fn acknowledged(mut self, acknowledged: bool) -> Self {
        self.acknowledged = acknowledged;
        self
    }

    /// Serialize the receipt body without signing it.
    pub fn to_json(&self) -> Vec<u8> {
        let body = ReceiptJson {
            order_id: &self.order_id,
            package_name: &self.package_name,
            product_id: &self.product_id,
            purchase_time: self.purchase_time,
            purchase_state: self.state.to_receipt_code(),
            purchase_token: &self.purchase_token,
            developer_payload: &self.developer_payload,
            auto_renewing: self.auto_renewing,
            acknowledged: self.acknowledged,
        };
        // Serializing a struct of strings, integers and bools cannot fail.
        serde_json::to_vec(&body).unwrap_or_default()
    }

    /// Build and sign the receipt.
    pub fn sign(self, keypair: &Keypair) -> RawPurchase {
        let json = self.to_json();
        let signature: Ed25519Signature = keypair.sign(&json);
        RawPurchase::new(json, signature.as_bytes().to_vec())
    }

    /// Build the receipt with an empty signature.
    pub fn unsigned(self) -> RawPurchase {
        RawPurchase::new(self.to_json(), Bytes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_signs_exact_bytes() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let raw = ReceiptBuilder::new("gold", "tok-1")
            .purchase_time(1_700_000_000_000)
            .sign(&keypair);

        let signature = Ed25519Signature::from_slice(&raw.signature).unwrap();
        assert!(keypair
            .public_key()
            .verify(&raw.original_json, &signature)
            .is_ok());
    }

    #[test]
    fn test_builder_json_fields() {
        let json = ReceiptBuilder::new("gold", "tok-1")
            .state(PurchaseState::Pending)
            .developer_payload("user-7")
            .to_json();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();

        assert_eq!(value["productId"], "gold");
        assert_eq!(value["purchaseToken"], "tok-1");
        assert_eq!(value["purchaseState"], 2);
        assert_eq!(value["developerPayload"], "user-7");
        assert_eq!(value["orderId"], "GPA.tok-1");
    }

    #[test]
    fn test_unsigned_has_empty_signature() {
        let raw = ReceiptBuilder::new("gold", "tok-1").unsigned();
        assert!(raw.signature.is_empty());
        assert!(!raw.original_json.is_empty());
    }
}
