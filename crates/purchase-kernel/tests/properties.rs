//! Property tests over whole sessions.

use proptest::prelude::*;
use purchase_kernel::gateway::PurchaseUpdate;
use purchase_kernel::{ProductKind, PurchaseOutcome, ResponseCode};
use purchase_kernel_testkit::fixtures::STORE_SEED;
use purchase_kernel_testkit::{receipt_from_params, ReceiptParams, TestStore};

fn block_on<F: std::future::Future<Output = ()>>(future: F) {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn restore_returns_only_held_purchases(
        consumed in 0usize..4,
        granted in 0usize..5,
        page_size in 1usize..4,
    ) {
        block_on(async move {
            let store = TestStore::new().await;
            let (session, listener) = store.connected().await;
            store.gateway.set_page_size(page_size).await;

            for _ in 0..consumed {
                session.purchase("coins", ProductKind::OneTime).await.unwrap();
                let (outcome, _) = listener.next_outcome().await.unwrap();
                assert_eq!(outcome, PurchaseOutcome::Success);
            }
            for _ in 0..granted {
                store.gateway.grant("gold", ProductKind::OneTime, false).await;
            }

            let restored = session.restore_purchases(ProductKind::OneTime).await.unwrap();
            assert_eq!(restored.len(), granted);
            assert!(restored.iter().all(|p| p.product_id == "gold" && p.acknowledged));
            assert!(!session.owns("coins").await);

            let again = session.restore_purchases(ProductKind::OneTime).await.unwrap();
            assert_eq!(again.len(), restored.len());
            assert_eq!(store.gateway.stats().await.acknowledges as usize, granted);
        });
    }

    #[test]
    fn foreign_receipts_are_never_granted(params: ReceiptParams) {
        prop_assume!(params.seed != STORE_SEED);

        block_on(async move {
            let store = TestStore::new().await;
            let (session, listener) = store.connected().await;

            store
                .gateway
                .push_update(PurchaseUpdate {
                    code: ResponseCode::Ok,
                    purchases: vec![receipt_from_params(&params)],
                })
                .await;

            let (outcome, purchase) = listener.next_outcome().await.unwrap();
            assert_eq!(outcome, PurchaseOutcome::InvalidSignature);
            assert!(purchase.is_none());
            assert!(session.purchases().await.is_empty());
            assert_eq!(store.gateway.stats().await.acknowledges, 0);
        });
    }
}
