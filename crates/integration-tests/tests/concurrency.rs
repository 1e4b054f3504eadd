//! Racing settlements.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use voucher_store_core::SettleOutcome;
use voucher_store_integration_tests::{Harness, delivered_codes, gift};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settles_of_one_purchase() {
    let h = Harness::new();
    h.stock(&gift(), &["A-0001", "A-0002", "A-0003", "A-0004", "A-0005"])
        .await;
    let purchase = h.order(&[(gift(), 3)]).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            let id = purchase.id.clone();
            tokio::spawn(async move { engine.settle(&id).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    let finalized = outcomes
        .iter()
        .filter(|o| matches!(o, SettleOutcome::Finalized { delivered: 3 }))
        .count();
    assert_eq!(finalized, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, SettleOutcome::Finalized { .. } | SettleOutcome::Unchanged))
    );

    let stored = h.reload(&purchase.id).await;
    assert_eq!(stored.delivered.len(), 3);
    assert_eq!(h.in_stock(&gift()).await, 2);
    assert_eq!(h.store.vat_entries().await.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settles_never_share_items() {
    let h = Harness::new();
    let codes: Vec<String> = (1..=5).map(|n| format!("CODE-{n:04}")).collect();
    let code_refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    h.stock(&gift(), &code_refs).await;

    let mut purchases = Vec::new();
    for _ in 0..4 {
        purchases.push(h.order(&[(gift(), 2)]).await);
    }

    let tasks: Vec<_> = purchases
        .iter()
        .map(|purchase| {
            let engine = h.engine.clone();
            let id = purchase.id.clone();
            tokio::spawn(async move { engine.settle(&id).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for purchase in &purchases {
        let stored = h.reload(&purchase.id).await;
        for code in delivered_codes(&stored) {
            assert!(seen.insert(code), "code delivered twice");
            total += 1;
        }
    }
    assert_eq!(total, 5);
    assert_eq!(h.in_stock(&gift()).await, 0);
}
