//! Receipt verification.
//!
//! Checks the store's signature over the receipt bytes exactly as received.
//! Re-encoding a receipt (for example by parsing and re-serializing its JSON)
//! changes its byte layout and breaks the signature, so verification always
//! runs on [`RawPurchase::original_json`] and never on a rebuilt form.
//!
//! # Test receipts
//!
//! Product ids starting with [`TEST_PURCHASE_PREFIX`] are the store's
//! reserved sandbox ids. Receipts for them are reported as
//! [`VerificationResult::TestReceipt`] without looking at the signature, so a
//! client can exercise its purchase UI before it has real signed receipts.
//! This is a trust bypass: it is only reachable through the reserved prefix,
//! which the store never assigns to a production product, and hosts can
//! refuse test receipts outright through the lifecycle configuration.

use serde::{Deserialize, Serialize};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::purchase::RawPurchase;

/// Reserved prefix of sandbox product ids.
pub const TEST_PURCHASE_PREFIX: &str = "android.test";
/// Sandbox product that always completes successfully.
pub const TEST_PURCHASE_SUCCESS: &str = "android.test.purchased";
/// Sandbox product whose purchase is always canceled.
pub const TEST_PURCHASE_CANCELED: &str = "android.test.canceled";
/// Sandbox product whose purchase is always refunded.
pub const TEST_PURCHASE_REFUNDED: &str = "android.test.refunded";
/// Sandbox product that is never available.
pub const TEST_PURCHASE_UNAVAILABLE: &str = "android.test.item_unavailable";

/// Outcome of verifying a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationResult {
    /// Signature matches the configured key.
    Valid,
    /// Malformed signature, wrong key or tampered payload.
    InvalidSignature,
    /// No receipt bytes to verify.
    MissingReceipt,
    /// Reserved sandbox product; signature not checked.
    TestReceipt,
}

impl VerificationResult {
    /// Whether the receipt may move on to the `Purchased` state.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Valid | Self::TestReceipt)
    }
}

/// Whether a product id is one of the store's reserved sandbox ids.
pub fn is_test_product(product_id: &str) -> bool {
    product_id.starts_with(TEST_PURCHASE_PREFIX)
}

/// Verify `signature` over `payload` with `public_key`.
///
/// Returns `false` on a malformed key, a malformed signature, a wrong key or a
/// tampered payload. Pure; safe to call from any thread.
pub fn verify(payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key) = Ed25519PublicKey::from_slice(public_key) else {
        return false;
    };
    let Ok(signature) = Ed25519Signature::from_slice(signature) else {
        return false;
    };
    key.verify(payload, &signature).is_ok()
}

/// Verify a raw receipt whose product id has already been read.
pub fn verify_receipt(
    raw: &RawPurchase,
    product_id: &str,
    public_key: &Ed25519PublicKey,
) -> VerificationResult {
    if raw.original_json.is_empty() {
        return VerificationResult::MissingReceipt;
    }

    if is_test_product(product_id) {
        return VerificationResult::TestReceipt;
    }

    let Ok(signature) = Ed25519Signature::from_slice(&raw.signature) else {
        return VerificationResult::InvalidSignature;
    };
    match public_key.verify(&raw.original_json, &signature) {
        Ok(()) => VerificationResult::Valid,
        Err(_) => VerificationResult::InvalidSignature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::purchase::ReceiptBuilder;
    use proptest::prelude::*;

    fn make_test_keypair() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    #[test]
    fn test_valid_receipt() {
        let keypair = make_test_keypair();
        let raw = ReceiptBuilder::new("gold", "tok-1").sign(&keypair);

        assert_eq!(
            verify_receipt(&raw, "gold", &keypair.public_key()),
            VerificationResult::Valid
        );
    }

    #[test]
    fn test_wrong_key() {
        let raw = ReceiptBuilder::new("gold", "tok-1").sign(&make_test_keypair());
        let other = Keypair::from_seed(&[0x07; 32]);

        assert_eq!(
            verify_receipt(&raw, "gold", &other.public_key()),
            VerificationResult::InvalidSignature
        );
    }

    #[test]
    fn test_reserialized_json_fails() {
        let keypair = make_test_keypair();
        let raw = ReceiptBuilder::new("gold", "tok-1").sign(&keypair);

        // Parse and pretty-print: same data, different bytes.
        let value: serde_json::Value = serde_json::from_slice(&raw.original_json).unwrap();
        let reencoded = serde_json::to_vec_pretty(&value).unwrap();
        assert_ne!(reencoded, raw.original_json.to_vec());

        let rebuilt = RawPurchase::new(reencoded, raw.signature.clone());
        assert_eq!(
            verify_receipt(&rebuilt, "gold", &keypair.public_key()),
            VerificationResult::InvalidSignature
        );
    }

    #[test]
    fn test_test_prefix_bypasses_signature() {
        let keypair = make_test_keypair();
        let raw = RawPurchase::new(
            ReceiptBuilder::new(TEST_PURCHASE_SUCCESS, "tok-1").to_json(),
            b"definitely not a signature".to_vec(),
        );

        assert_eq!(
            verify_receipt(&raw, TEST_PURCHASE_SUCCESS, &keypair.public_key()),
            VerificationResult::TestReceipt
        );
    }

    #[test]
    fn test_empty_signature_is_never_test_receipt() {
        let keypair = make_test_keypair();
        let raw = ReceiptBuilder::new("gold", "tok-1").unsigned();

        assert_eq!(
            verify_receipt(&raw, "gold", &keypair.public_key()),
            VerificationResult::InvalidSignature
        );
    }

    #[test]
    fn test_missing_receipt() {
        let keypair = make_test_keypair();
        let raw = RawPurchase::new(Vec::new(), Vec::new());

        assert_eq!(
            verify_receipt(&raw, "gold", &keypair.public_key()),
            VerificationResult::MissingReceipt
        );
    }

    #[test]
    fn test_malformed_key_is_false() {
        let keypair = make_test_keypair();
        let raw = ReceiptBuilder::new("gold", "tok-1").sign(&keypair);
        assert!(!verify(&raw.original_json, &raw.signature, &[0u8; 5]));
    }

    proptest! {
        #[test]
        fn signature_round_trip(seed in any::<[u8; 32]>(), payload in prop::collection::vec(any::<u8>(), 0..256)) {
            let keypair = Keypair::from_seed(&seed);
            let signature = keypair.sign(&payload);
            prop_assert!(verify(&payload, signature.as_bytes(), keypair.public_key().as_bytes()));
        }

        #[test]
        fn payload_flip_fails(
            payload in prop::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let keypair = make_test_keypair();
            let signature = keypair.sign(&payload);
            let mut tampered = payload.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= mask;
            prop_assert!(!verify(&tampered, signature.as_bytes(), keypair.public_key().as_bytes()));
        }

        #[test]
        fn signature_flip_fails(
            payload in prop::collection::vec(any::<u8>(), 0..256),
            index in 0usize..64,
            mask in 1u8..=255,
        ) {
            let keypair = make_test_keypair();
            let mut signature = *keypair.sign(&payload).as_bytes();
            signature[index] ^= mask;
            prop_assert!(!verify(&payload, &signature, keypair.public_key().as_bytes()));
        }
    }
}
