//! Order submission.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Days;

use voucher_store_core::{
    AccessKey, CountryId, OrderError, PaymentKey, PurchaseId, PurchaseStatus, StockKey,
};
use voucher_store_integration_tests::{Harness, SequenceIds, game, gift, sim, today};
use voucher_store_shop::db::{PurchaseRepository, RepositoryError};
use voucher_store_shop::services::{EngineError, IdSource, OrderRequest, RandomIds};

fn request(items: Vec<(StockKey, u32)>) -> OrderRequest {
    OrderRequest {
        items,
        country_code: CountryId::new("DE"),
        notify: None,
    }
}

#[tokio::test]
async fn test_quantity_capped_at_stock() {
    let h = Harness::new();
    h.stock(&gift(), &["A", "B", "C", "D", "E"]).await;

    let purchase = h.order(&[(gift(), 1000)]).await;
    assert_eq!(purchase.ordered.quantities().get(&gift()), Some(&5));
}

#[tokio::test]
async fn test_on_demand_cap_adds_headroom() {
    let h = Harness::new();
    h.stock(&game(), &["A", "B", "C", "D", "E"]).await;

    let purchase = h.order(&[(game(), 1000)]).await;
    assert_eq!(purchase.ordered.quantities().get(&game()), Some(&105));
}

#[tokio::test]
async fn test_new_purchase_fields() {
    let h = Harness::new();
    h.stock(&gift(), &["A"]).await;

    let purchase = h.order(&[(gift(), 1)]).await;
    assert_eq!(purchase.status, PurchaseStatus::New);
    assert_eq!(purchase.create_date, today());
    assert_eq!(
        purchase.delete_date,
        Some(today().checked_add_days(Days::new(31)).unwrap())
    );
    assert_eq!(purchase.id.as_str().len(), 6);
    assert_eq!(purchase.access_key.as_str().len(), 16);
    assert_eq!(purchase.sum().as_i64(), 1000);
    assert_eq!(h.reload(&purchase.id).await, purchase);
}

#[tokio::test]
async fn test_out_of_stock_order_is_empty() {
    let h = Harness::new();
    let result = h.engine.insert_purchase(request(vec![(gift(), 1)])).await;
    assert!(matches!(result, Err(EngineError::Order(OrderError::Empty))));
}

#[tokio::test]
async fn test_country_key_must_fit_variant() {
    let h = Harness::new();
    let result = h
        .engine
        .insert_purchase(request(vec![(StockKey::new("sim-15", "all"), 1)]))
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Order(OrderError::CountryNotAvailable { .. }))
    ));

    let purchase = h.order(&[(sim("FR"), 2)]).await;
    assert_eq!(purchase.ordered.quantities().get(&sim("FR")), Some(&2));
}

#[tokio::test]
async fn test_invalid_tax_country() {
    let h = Harness::new();
    h.stock(&gift(), &["A"]).await;
    let result = h
        .engine
        .insert_purchase(OrderRequest {
            items: vec![(gift(), 1)],
            country_code: CountryId::new("Germany"),
            notify: None,
        })
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Order(OrderError::InvalidTaxCountry(_)))
    ));
}

#[tokio::test]
async fn test_id_collision_is_retried() {
    let h = Harness::with_ids(Arc::new(SequenceIds::new([
        "AAA222", "AAA222", "AAA222", "BBB333",
    ])));
    h.stock(&gift(), &["A", "B"]).await;

    let first = h.order(&[(gift(), 1)]).await;
    assert_eq!(first.id.as_str(), "AAA222");

    let second = h.order(&[(gift(), 1)]).await;
    assert_eq!(second.id.as_str(), "BBB333");
}

#[tokio::test]
async fn test_out_of_ids_after_five_collisions() {
    let h = Harness::with_ids(Arc::new(SequenceIds::new([
        "AAA222", "AAA222", "AAA222", "AAA222", "AAA222", "AAA222",
    ])));
    h.stock(&gift(), &["A", "B"]).await;
    h.order(&[(gift(), 1)]).await;

    let result = h.engine.insert_purchase(request(vec![(gift(), 1)])).await;
    assert!(matches!(result, Err(EngineError::OutOfIds)));
    assert_eq!(h.store.purchase_count().await, 1);
}

/// Random IDs, but the same payment key for the first `repeats` calls.
struct RepeatedPaymentKey {
    repeats: usize,
    calls: AtomicUsize,
}

impl IdSource for RepeatedPaymentKey {
    fn purchase_id(&self) -> PurchaseId {
        RandomIds.purchase_id()
    }

    fn access_key(&self) -> AccessKey {
        RandomIds.access_key()
    }

    fn payment_key(&self) -> PaymentKey {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.repeats {
            PaymentKey::new("same-payment-key")
        } else {
            RandomIds.payment_key()
        }
    }
}

#[tokio::test]
async fn test_purchase_keys_are_unique() {
    let h = Harness::new();
    h.stock(&gift(), &["A", "B"]).await;
    let first = h.order(&[(gift(), 1)]).await;

    let mut same_access = first.clone();
    same_access.id = PurchaseId::new("BBB333");
    same_access.payment_key = PaymentKey::new("other-payment-key");
    assert!(matches!(
        h.store.insert_purchase(&same_access).await,
        Err(RepositoryError::Conflict(_))
    ));

    let mut same_payment = first.clone();
    same_payment.id = PurchaseId::new("CCC444");
    same_payment.access_key = AccessKey::new("other-access-key");
    assert!(matches!(
        h.store.insert_purchase(&same_payment).await,
        Err(RepositoryError::Conflict(_))
    ));

    assert_eq!(h.store.purchase_count().await, 1);
}

#[tokio::test]
async fn test_payment_key_collision_is_retried() {
    let h = Harness::with_ids(Arc::new(RepeatedPaymentKey {
        repeats: 3,
        calls: AtomicUsize::new(0),
    }));
    h.stock(&gift(), &["A", "B"]).await;

    let first = h.order(&[(gift(), 1)]).await;
    assert_eq!(first.payment_key.as_str(), "same-payment-key");

    let second = h.order(&[(gift(), 1)]).await;
    assert_ne!(second.payment_key, first.payment_key);
    assert_eq!(h.store.purchase_count().await, 2);
}

#[tokio::test]
async fn test_country_locked_once_paid() {
    let h = Harness::new();
    h.stock(&gift(), &["A"]).await;
    let purchase = h.order(&[(gift(), 1)]).await;

    assert!(matches!(
        h.engine
            .set_country(&purchase.id, &CountryId::new("all"))
            .await,
        Err(EngineError::Order(OrderError::InvalidTaxCountry(_)))
    ));
    h.engine
        .set_country(&purchase.id, &CountryId::new("non-EU"))
        .await
        .unwrap();
    assert_eq!(
        h.reload(&purchase.id).await.country_code,
        CountryId::new("non-EU")
    );

    h.engine.confirm_payment(&purchase.id).await.unwrap();
    assert!(matches!(
        h.engine
            .set_country(&purchase.id, &CountryId::new("FR"))
            .await,
        Err(EngineError::CountryLocked(_))
    ));
}
