//! Proptest generators for property-based testing.

use proptest::prelude::*;

use purchase_kernel_core::{
    Keypair, ProductKind, PurchaseState, RawPurchase, ReceiptBuilder, TEST_PURCHASE_PREFIX,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a production product id (never a reserved sandbox id).
pub fn product_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,23}"
        .prop_filter("reserved sandbox id", |id| !id.starts_with(TEST_PURCHASE_PREFIX))
}

/// Generate a purchase token.
pub fn purchase_token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{8,48}".prop_map(String::from)
}

pub fn purchase_state() -> impl Strategy<Value = PurchaseState> {
    prop_oneof![
        Just(PurchaseState::Purchased),
        Just(PurchaseState::Canceled),
        Just(PurchaseState::Pending),
    ]
}

pub fn product_kind() -> impl Strategy<Value = ProductKind> {
    prop_oneof![Just(ProductKind::OneTime), Just(ProductKind::Subscription)]
}

/// Generate developer payload text, including characters JSON must escape.
pub fn developer_payload(max_len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(any::<char>(), 0..=max_len).prop_map(|c| c.into_iter().collect())
}

/// Parameters for generating a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptParams {
    pub seed: [u8; 32],
    pub product_id: String,
    pub purchase_token: String,
    pub purchase_time: i64,
    pub state: PurchaseState,
    pub developer_payload: String,
    pub auto_renewing: bool,
    pub acknowledged: bool,
}

impl ReceiptParams {
    pub fn keypair(&self) -> Keypair {
        Keypair::from_seed(&self.seed)
    }

    pub fn builder(&self) -> ReceiptBuilder {
        ReceiptBuilder::new(self.product_id.clone(), self.purchase_token.clone())
            .purchase_time(self.purchase_time)
            .state(self.state)
            .developer_payload(self.developer_payload.clone())
            .auto_renewing(self.auto_renewing)
            .acknowledged(self.acknowledged)
    }
}

impl Arbitrary for ReceiptParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            product_id(),
            purchase_token(),
            0i64..=4_102_444_800_000i64,
            purchase_state(),
            developer_payload(64),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(seed, product_id, purchase_token, purchase_time, state, payload, renewing, acked)| {
                    ReceiptParams {
                        seed,
                        product_id,
                        purchase_token,
                        purchase_time,
                        state,
                        developer_payload: payload,
                        auto_renewing: renewing,
                        acknowledged: acked,
                    }
                },
            )
            .boxed()
    }
}

/// Sign a receipt from parameters with their own key.
pub fn receipt_from_params(params: &ReceiptParams) -> RawPurchase {
    params.builder().sign(&params.keypair())
}

#[cfg(test)]
mod tests {
    use super::*;
    use purchase_kernel_core::{normalize_purchase, verify_receipt, VerificationResult};

    proptest! {
        #[test]
        fn test_generated_receipts_verify(params: ReceiptParams) {
            let raw = receipt_from_params(&params);
            let purchase = normalize_purchase(&raw).unwrap();

            prop_assert_eq!(&purchase.product_id, &params.product_id);
            prop_assert_eq!(purchase.purchase_token.as_str(), params.purchase_token.as_str());
            prop_assert_eq!(&purchase.payload, &params.developer_payload);
            prop_assert_eq!(purchase.state, params.state);
            prop_assert_eq!(
                verify_receipt(&raw, &purchase.product_id, &params.keypair().public_key()),
                VerificationResult::Valid
            );
        }

        #[test]
        fn test_foreign_key_never_verifies(params: ReceiptParams, other in keypair()) {
            prop_assume!(other.public_key() != params.keypair().public_key());
            let raw = receipt_from_params(&params);

            prop_assert_eq!(
                verify_receipt(&raw, &params.product_id, &other.public_key()),
                VerificationResult::InvalidSignature
            );
        }
    }
}
