//! Periodic maintenance: cleanup and replenishment sweeps.

#![allow(clippy::unwrap_used)]

use voucher_store_core::PurchaseStatus;
use voucher_store_integration_tests::{Harness, gift, sim};
use voucher_store_shop::db::PurchaseRepository;
use voucher_store_shop::services::run_maintenance;

#[tokio::test]
async fn test_unpaid_purchase_removed_after_delete_date() {
    let h = Harness::new();
    h.stock(&gift(), &["A"]).await;
    let purchase = h.order(&[(gift(), 1)]).await;

    // the delete date itself is still kept
    h.clock.advance(31);
    assert_eq!(h.engine.cleanup().await.unwrap(), 0);

    h.clock.advance(1);
    assert_eq!(h.engine.cleanup().await.unwrap(), 1);
    assert!(
        h.store
            .purchase_by_id(&purchase.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_underdelivered_purchase_never_removed() {
    let h = Harness::new();
    let purchase = h.order(&[(sim("DE"), 1)]).await;
    h.engine.settle(&purchase.id).await.unwrap();
    assert_eq!(
        h.reload(&purchase.id).await.status,
        PurchaseStatus::Underdelivered
    );

    h.clock.advance(10_000);
    assert_eq!(h.engine.cleanup().await.unwrap(), 0);
    assert_eq!(h.reload(&purchase.id).await.delete_date, None);
}

#[tokio::test]
async fn test_finalized_purchase_kept_for_retention_period() {
    let h = Harness::new();
    h.stock(&gift(), &["A"]).await;
    let purchase = h.order(&[(gift(), 1)]).await;

    // paid ten days later: retention counts from the delivery
    h.clock.advance(10);
    h.engine.confirm_payment(&purchase.id).await.unwrap();

    h.clock.advance(31);
    assert_eq!(h.engine.cleanup().await.unwrap(), 0);
    h.clock.advance(1);
    assert_eq!(h.engine.cleanup().await.unwrap(), 1);
}

#[tokio::test]
async fn test_maintenance_retries_underdelivered_purchases() {
    let h = Harness::new();
    let purchase = h.order(&[(sim("DE"), 1)]).await;
    h.engine.settle(&purchase.id).await.unwrap();

    // stock that arrived without a sweep, as after a rolled back competitor
    h.stock(&sim("DE"), &["SIM-0001"]).await;
    run_maintenance(&h.engine).await;

    assert_eq!(
        h.reload(&purchase.id).await.status,
        PurchaseStatus::Finalized
    );
    assert_eq!(h.in_stock(&sim("DE")).await, 0);
}
