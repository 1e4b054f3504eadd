//! In-memory backend with the same semantics as [`super::PgStore`].
//!
//! A settlement transaction holds the store lock from `begin` until commit or
//! drop and works on a copy of the state; commit swaps the copy in. All
//! transactions are therefore serialized and a dropped transaction leaves no
//! trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use voucher_store_core::{
    AccessKey, CountryId, Notify, PaymentKey, Purchase, PurchaseId, PurchaseStatus, StockCounts,
    StockItem, StockItemId, StockKey, StockPayload, VariantId, VatEntry,
};

use super::{PurchaseRepository, RepositoryError, SettleTx, StockLedger, Store};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    purchases: BTreeMap<PurchaseId, Purchase>,
    stock: Vec<StockItem>,
    next_stock_id: i64,
    vat: Vec<VatEntry>,
}

impl MemoryState {
    fn push_stock(
        &mut self,
        key: &StockKey,
        payload: &StockPayload,
        added_at: DateTime<Utc>,
    ) -> StockItemId {
        self.next_stock_id += 1;
        let id = StockItemId::new(self.next_stock_id);
        self.stock.push(StockItem {
            id,
            key: key.clone(),
            payload: payload.clone(),
            added_at,
        });
        id
    }

    fn counts(&self, filter: impl Fn(&StockKey) -> bool) -> StockCounts {
        StockCounts::from_rows(
            self.stock
                .iter()
                .filter(|item| filter(&item.key))
                .map(|item| (item.key.clone(), 1)),
        )
    }
}

/// Process-local [`Store`]. Cloning shares the data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stock item with an explicit insertion time.
    pub async fn add_item_at(
        &self,
        key: &StockKey,
        payload: &StockPayload,
        added_at: DateTime<Utc>,
    ) -> StockItemId {
        self.state.lock().await.push_stock(key, payload, added_at)
    }

    /// Everything written to the VAT log so far.
    pub async fn vat_entries(&self) -> Vec<VatEntry> {
        self.state.lock().await.vat.clone()
    }

    /// Number of stored purchases.
    pub async fn purchase_count(&self) -> usize {
        self.state.lock().await.purchases.len()
    }
}

#[async_trait]
impl PurchaseRepository for MemoryStore {
    async fn insert_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.purchases.contains_key(&purchase.id) {
            return Err(RepositoryError::Conflict(
                "purchase ID already exists".to_owned(),
            ));
        }
        let key_taken = state.purchases.values().any(|p| {
            p.access_key == purchase.access_key || p.payment_key == purchase.payment_key
        });
        if key_taken {
            return Err(RepositoryError::Conflict(
                "purchase key already exists".to_owned(),
            ));
        }
        state
            .purchases
            .insert(purchase.id.clone(), purchase.clone());
        Ok(())
    }

    async fn purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self.state.lock().await.purchases.get(id).cloned())
    }

    async fn purchase_by_access_key(
        &self,
        id: &PurchaseId,
        access_key: &AccessKey,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .get(id)
            .filter(|p| &p.access_key == access_key)
            .cloned())
    }

    async fn purchase_by_payment_key(
        &self,
        id: &PurchaseId,
        payment_key: &PaymentKey,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .get(id)
            .filter(|p| &p.payment_key == payment_key)
            .cloned())
    }

    async fn ids_by_status(
        &self,
        status: PurchaseStatus,
    ) -> Result<Vec<PurchaseId>, RepositoryError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Purchase> = state
            .purchases
            .values()
            .filter(|p| p.status == status)
            .collect();
        matching.sort_by(|a, b| (a.create_date, &a.id).cmp(&(b.create_date, &b.id)));
        Ok(matching.into_iter().map(|p| p.id.clone()).collect())
    }

    async fn ids_like(&self, fragment: &str) -> Result<Vec<PurchaseId>, RepositoryError> {
        let needle = fragment.to_uppercase();
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .keys()
            .filter(|id| id.as_str().to_uppercase().contains(&needle))
            .take(50)
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        id: &PurchaseId,
        from: PurchaseStatus,
        to: PurchaseStatus,
        delete_date: Option<NaiveDate>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.purchases.get_mut(id) {
            Some(purchase) if purchase.status == from => {
                purchase.status = to;
                purchase.delete_date = delete_date;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_notify(
        &self,
        id: &PurchaseId,
        notify: Option<&Notify>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let purchase = state
            .purchases
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        purchase.notify = notify.cloned();
        Ok(())
    }

    async fn set_country(
        &self,
        id: &PurchaseId,
        country: &CountryId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.purchases.get_mut(id) {
            Some(purchase) if purchase.status == PurchaseStatus::New => {
                purchase.country_code = country.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cleanup(&self, today: NaiveDate) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.purchases.len();
        state.purchases.retain(|_, p| {
            let expired = p.delete_date.is_some_and(|date| date < today);
            !(expired && p.status.is_cleanup_candidate())
        });
        Ok(u64::try_from(before - state.purchases.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl StockLedger for MemoryStore {
    async fn add_item(
        &self,
        key: &StockKey,
        payload: &StockPayload,
    ) -> Result<StockItemId, RepositoryError> {
        Ok(self.add_item_at(key, payload, Utc::now()).await)
    }

    async fn count_by_variant(&self, variant: &VariantId) -> Result<StockCounts, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.counts(|key| &key.variant_id == variant))
    }

    async fn count_all(&self) -> Result<StockCounts, RepositoryError> {
        Ok(self.state.lock().await.counts(|_| true))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn SettleTx>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemorySettleTx { guard, work }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct MemorySettleTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl SettleTx for MemorySettleTx {
    async fn lock_purchase(
        &mut self,
        id: &PurchaseId,
    ) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self.work.purchases.get(id).cloned())
    }

    async fn withdraw_oldest(
        &mut self,
        key: &StockKey,
        max: u32,
    ) -> Result<Vec<StockItem>, RepositoryError> {
        let (mut matching, rest): (Vec<StockItem>, Vec<StockItem>) = self
            .work
            .stock
            .drain(..)
            .partition(|item| &item.key == key);
        self.work.stock = rest;

        matching.sort_by_key(|item| (item.added_at, item.id));
        let take = usize::try_from(max).unwrap_or(usize::MAX).min(matching.len());
        let left = matching.split_off(take);
        self.work.stock.extend(left);
        Ok(matching)
    }

    async fn log_vat(&mut self, entries: &[VatEntry]) -> Result<(), RepositoryError> {
        self.work.vat.extend_from_slice(entries);
        Ok(())
    }

    async fn save_settlement(&mut self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let stored = self
            .work
            .purchases
            .get_mut(&purchase.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.status = purchase.status;
        stored.delivered = purchase.delivered.clone();
        stored.delete_date = purchase.delete_date;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn code(s: &str) -> StockPayload {
        StockPayload::Code(s.to_string())
    }

    #[tokio::test]
    async fn test_withdraw_oldest_first() {
        let store = MemoryStore::new();
        let key = StockKey::new("gift-10", "all");
        let newer = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let older = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        store.add_item_at(&key, &code("NEWER"), newer).await;
        store.add_item_at(&key, &code("OLDER"), older).await;
        store
            .add_item_at(&StockKey::new("gift-10", "DE"), &code("OTHER"), older)
            .await;

        let mut tx = store.begin().await.unwrap();
        let items = tx.withdraw_oldest(&key, 1).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload, code("OLDER"));
        let counts = store.count_all().await.unwrap();
        assert_eq!(counts.get(&key), 1);
        assert_eq!(counts.get(&StockKey::new("gift-10", "DE")), 1);
    }

    #[tokio::test]
    async fn test_withdraw_more_than_available() {
        let store = MemoryStore::new();
        let key = StockKey::new("gift-10", "all");
        store.add_item(&key, &code("A")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let items = tx.withdraw_oldest(&key, 5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(tx.withdraw_oldest(&key, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let key = StockKey::new("gift-10", "all");
        store.add_item(&key, &code("A")).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            assert_eq!(tx.withdraw_oldest(&key, 1).await.unwrap().len(), 1);
        }

        assert_eq!(store.count_all().await.unwrap().get(&key), 1);
    }

    #[tokio::test]
    async fn test_count_by_variant() {
        let store = MemoryStore::new();
        store
            .add_item(&StockKey::new("sim", "DE"), &code("A"))
            .await
            .unwrap();
        store
            .add_item(&StockKey::new("sim", "AT"), &code("B"))
            .await
            .unwrap();
        store
            .add_item(&StockKey::new("gift", "all"), &code("C"))
            .await
            .unwrap();

        let counts = store.count_by_variant(&VariantId::new("sim")).await.unwrap();
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.get(&StockKey::new("sim", "AT")), 1);
    }
}
