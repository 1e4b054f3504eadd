//! Test harness for voucher store behaviour tests.
//!
//! Everything runs against [`MemoryStore`], which has the same transaction
//! semantics as the Postgres store, with a fixed clock and a notifier that
//! records what it was asked to send.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p voucher-store-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use voucher_store_core::{
    AccessKey, Article, Catalog, Cents, CountryId, Notify, PaymentKey, Purchase, PurchaseId,
    StockKey, StockPayload, Variant, VariantId,
};
use voucher_store_shop::db::{MemoryStore, PurchaseRepository, StockLedger};
use voucher_store_shop::services::{
    Clock, FixedClock, FulfilmentEngine, IdSource, Notification, NotificationError,
    NotificationSender, OrderRequest, RandomIds,
};

/// The date every harness starts at.
#[must_use]
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

/// Gift cards (global stock), SIM cards (per country, on demand) and a
/// game key (global, on demand).
#[must_use]
pub fn catalog() -> Catalog {
    fn variant(id: &str, price: i64, has_country: bool, on_demand: bool) -> Variant {
        Variant {
            id: VariantId::new(id),
            name: id.to_string(),
            price: Cents::new(price),
            has_country,
            on_demand,
            warn_stock: 0,
        }
    }

    Catalog {
        articles: vec![
            Article {
                id: "gift".to_string(),
                brand: "Example".to_string(),
                name: "Gift card".to_string(),
                hide: false,
                variants: vec![variant("gift-10", 1000, false, false)],
            },
            Article {
                id: "sim".to_string(),
                brand: "Example Mobile".to_string(),
                name: "Prepaid SIM".to_string(),
                hide: false,
                variants: vec![variant("sim-15", 1500, true, true)],
            },
            Article {
                id: "game".to_string(),
                brand: "Example Games".to_string(),
                name: "Game key".to_string(),
                hide: false,
                variants: vec![variant("game", 2999, false, true)],
            },
        ],
    }
}

/// Stock key of the global gift card.
#[must_use]
pub fn gift() -> StockKey {
    StockKey::new("gift-10", "all")
}

/// Stock key of the on-demand game key.
#[must_use]
pub fn game() -> StockKey {
    StockKey::new("game", "all")
}

/// Stock key of the SIM card for `country`.
#[must_use]
pub fn sim(country: &str) -> StockKey {
    StockKey::new("sim-15", country)
}

// =============================================================================
// Test doubles
// =============================================================================

/// Records notifications instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Notify, Notification)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Everything sent so far.
    pub fn sent(&self) -> Vec<(Notify, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every following send fail.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        target: &Notify,
        notification: &Notification,
    ) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::NotConfigured(target.proto));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), notification.clone()));
        Ok(())
    }
}

/// Hands out predetermined purchase IDs, then random ones.
#[derive(Debug, Default)]
pub struct SequenceIds {
    ids: Mutex<VecDeque<PurchaseId>>,
}

impl SequenceIds {
    #[must_use]
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().map(PurchaseId::new).collect()),
        }
    }
}

impl IdSource for SequenceIds {
    fn purchase_id(&self) -> PurchaseId {
        self.ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RandomIds.purchase_id())
    }

    fn access_key(&self) -> AccessKey {
        RandomIds.access_key()
    }

    fn payment_key(&self) -> PaymentKey {
        RandomIds.payment_key()
    }
}

// =============================================================================
// Harness
// =============================================================================

/// An engine over a fresh in-memory store.
pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: FulfilmentEngine,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ids(Arc::new(RandomIds))
    }

    #[must_use]
    pub fn with_ids(ids: Arc<dyn IdSource>) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(today()));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = FulfilmentEngine::new(
            Arc::new(store.clone()),
            Arc::new(catalog()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            ids,
            Arc::clone(&notifier) as Arc<dyn NotificationSender>,
        );
        Self {
            store,
            clock,
            notifier,
            engine,
        }
    }

    /// Put codes straight into the ledger, without a sweep.
    pub async fn stock(&self, key: &StockKey, codes: &[&str]) {
        for code in codes {
            self.store
                .add_item(key, &StockPayload::Code((*code).to_string()))
                .await
                .unwrap();
        }
    }

    /// Submit an order for the tax country `DE`.
    pub async fn order(&self, items: &[(StockKey, u32)]) -> Purchase {
        self.order_with_notify(items, None).await
    }

    /// Submit an order with a notify target.
    pub async fn order_with_notify(
        &self,
        items: &[(StockKey, u32)],
        notify: Option<Notify>,
    ) -> Purchase {
        self.engine
            .insert_purchase(OrderRequest {
                items: items.to_vec(),
                country_code: CountryId::new("DE"),
                notify,
            })
            .await
            .unwrap()
    }

    /// The stored state of a purchase.
    pub async fn reload(&self, id: &PurchaseId) -> Purchase {
        self.store.purchase_by_id(id).await.unwrap().unwrap()
    }

    /// Stock left for a key.
    pub async fn in_stock(&self, key: &StockKey) -> u32 {
        self.store.count_all().await.unwrap().get(key)
    }
}

/// Codes delivered to a purchase, in delivery order.
#[must_use]
pub fn delivered_codes(purchase: &Purchase) -> Vec<String> {
    purchase
        .delivered
        .iter()
        .filter_map(|item| item.payload.code().map(str::to_string))
        .collect()
}

/// An email notify target.
#[must_use]
pub fn email(addr: &str) -> Notify {
    Notify::parse(Some("email"), addr).unwrap().unwrap()
}
