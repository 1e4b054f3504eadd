//! The fulfilment engine.
//!
//! Drives purchases through their lifecycle: order submission, payment
//! events, settlement against the stock ledger, replenishment sweeps,
//! customer notifications and cleanup.
//!
//! # Settlement
//!
//! [`FulfilmentEngine::settle`] runs in one store transaction. The purchase
//! row is locked first and the unfulfilled remainder is recomputed from what
//! is persisted, so concurrent settlements of the same purchase serialize and
//! the second one sees the first one's deliveries. Every error rolls the
//! whole settlement back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use voucher_store_core::fulfilment::{conclude, deliver, delete_date_after, total_unfulfilled};
use voucher_store_core::{
    AccessKey, Catalog, Cents, CountryId, FulfilmentError, NewPurchase, Notify, NotifyError,
    Order, OrderError, PaymentEvent, PaymentKey, Purchase, PurchaseId, PurchaseStatus,
    SettleOutcome, StockCounts, StockKey, StockPayload, Transition, TransitionError, VariantId,
};

use super::clock::Clock;
use super::ids::IdSource;
use super::notify::{Notification, NotificationSender};
use crate::db::{RepositoryError, Store};
use crate::payment::PaymentNotice;

/// Attempts at finding an unused purchase ID.
pub const MAX_ID_ATTEMPTS: usize = 5;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no such purchase")]
    NotFound,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("purchase {id} is inconsistent: {source}")]
    Inconsistency {
        id: PurchaseId,
        #[source]
        source: FulfilmentError,
    },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("purchase {id}: {source}")]
    Transition {
        id: PurchaseId,
        #[source]
        source: TransitionError,
    },

    #[error("database ran out of IDs")]
    OutOfIds,

    #[error("unknown variant: {0}")]
    UnknownVariant(VariantId),

    #[error("the country of purchase {0} can no longer be changed")]
    CountryLocked(PurchaseId),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Customer input for a new purchase.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Requested quantity per stock key.
    pub items: Vec<(StockKey, u32)>,
    pub country_code: CountryId,
    pub notify: Option<Notify>,
}

/// What a payment event did to a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum PaymentOutcome {
    Processing,
    Expired,
    Settled(SettleOutcome),
    /// The event had already been applied.
    Ignored,
}

/// Result of a replenishment sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Underdelivered purchases looked at.
    pub attempted: usize,
    /// Purchases that are now fully delivered.
    pub finalized: usize,
    /// Purchases that received some but not all missing units.
    pub partial: usize,
    /// Units delivered across all purchases.
    pub delivered: usize,
    /// Purchases whose settlement failed.
    pub failed: usize,
}

/// Result of a stock upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockUpload {
    pub added: usize,
    pub sweep: SweepReport,
}

/// One row of the staff overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewRow {
    pub key: StockKey,
    /// Units owed to underdelivered purchases.
    pub unfulfilled: u32,
    pub in_stock: u32,
}

/// Purchase lifecycle and stock allocation.
#[derive(Clone)]
pub struct FulfilmentEngine {
    store: Arc<dyn Store>,
    catalog: Arc<Catalog>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    notifier: Arc<dyn NotificationSender>,
}

impl FulfilmentEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<Catalog>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            ids,
            notifier,
        }
    }

    /// The store this engine works on.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The product catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Create a purchase from customer input.
    ///
    /// Quantities are clamped to what can be ordered right now. ID and keys
    /// are drawn afresh, up to [`MAX_ID_ATTEMPTS`] times, while any of them
    /// is already taken.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Order` for input that yields no valid order and
    /// `EngineError::OutOfIds` if every ID attempt collided.
    #[instrument(skip(self, request), fields(country = %request.country_code))]
    pub async fn insert_purchase(&self, request: OrderRequest) -> Result<Purchase, EngineError> {
        let stock = self.store.count_all().await?;
        let order = Order::from_request(&self.catalog, &stock, request.items)?;
        let new = NewPurchase::new(
            order,
            request.country_code,
            request.notify,
            self.clock.today(),
        )?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let purchase = new.clone().into_purchase(
                self.ids.purchase_id(),
                self.ids.access_key(),
                self.ids.payment_key(),
            );
            match self.store.insert_purchase(&purchase).await {
                Ok(()) => {
                    info!(purchase_id = %purchase.id, sum = %purchase.sum(), "Created purchase");
                    return Ok(purchase);
                }
                Err(RepositoryError::Conflict(_)) => {
                    warn!(purchase_id = %purchase.id, "Purchase ID or key taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        error!("Could not find an unused purchase ID");
        Err(EngineError::OutOfIds)
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Deliver whatever the ledger holds for the purchase's unfulfilled lines.
    ///
    /// Idempotent: a purchase with nothing left to deliver, or one that has
    /// already been finalized, is returned as [`SettleOutcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// - `EngineError::NotFound` if the purchase does not exist.
    /// - `EngineError::Transition` if the purchase cannot be settled in its
    ///   status (e.g. `expired`).
    /// - `EngineError::Inconsistency` if the stored delivery does not fit
    ///   the order. Nothing is changed.
    #[instrument(skip(self, id), fields(purchase_id = %id))]
    pub async fn settle(&self, id: &PurchaseId) -> Result<SettleOutcome, EngineError> {
        let today = self.clock.today();
        let mut tx = self.store.begin().await?;

        let mut purchase = tx.lock_purchase(id).await?.ok_or(EngineError::NotFound)?;

        match purchase.status.on_event(PaymentEvent::Settled) {
            Ok(Transition::Settle) => {}
            Ok(_) => return Ok(SettleOutcome::Unchanged),
            Err(source) => {
                return Err(EngineError::Transition {
                    id: id.clone(),
                    source,
                });
            }
        }

        let unfulfilled = purchase
            .unfulfilled()
            .map_err(|source| inconsistency(id, source))?;
        if unfulfilled.is_empty() {
            debug!("Nothing to deliver");
            return Ok(SettleOutcome::Unchanged);
        }

        let mut delivered = 0;
        for line in unfulfilled.lines() {
            let items = tx.withdraw_oldest(&line.key, line.quantity).await?;
            if items.is_empty() {
                debug!(variant = %line.key.variant_id, country = %line.key.country_id, "Out of stock");
                continue;
            }
            for item in &items {
                debug!(
                    variant = %item.key.variant_id,
                    country = %item.key.country_id,
                    code = %item.payload.masked(),
                    "Withdrew stock item"
                );
            }
            delivered += items.len();

            let vat = deliver(&mut purchase, line, items, today)
                .map_err(|source| inconsistency(id, source))?;
            tx.log_vat(&vat).await?;
        }

        let outcome =
            conclude(&mut purchase, delivered, today).map_err(|source| inconsistency(id, source))?;
        tx.save_settlement(&purchase).await?;
        tx.commit().await?;

        match outcome {
            SettleOutcome::Finalized { delivered } => {
                info!(count = delivered, "Purchase finalized");
            }
            SettleOutcome::Underdelivered { delivered, missing } => {
                warn!(count = delivered, missing, "Purchase underdelivered");
            }
            SettleOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    /// Settle every underdelivered purchase, oldest first.
    ///
    /// A failing purchase is logged and skipped. Customers whose purchase
    /// becomes finalized are notified.
    ///
    /// # Errors
    ///
    /// Returns an error only if the purchases cannot be listed.
    #[instrument(skip(self))]
    pub async fn fulfil_underdelivered(&self) -> Result<SweepReport, EngineError> {
        let ids = self
            .store
            .ids_by_status(PurchaseStatus::Underdelivered)
            .await?;

        let mut report = SweepReport {
            attempted: ids.len(),
            ..SweepReport::default()
        };

        for id in &ids {
            match self.settle(id).await {
                Ok(SettleOutcome::Finalized { delivered }) => {
                    report.finalized += 1;
                    report.delivered += delivered;
                    self.notify(id, Notification::restocked).await;
                }
                Ok(SettleOutcome::Underdelivered { delivered, .. }) => {
                    if delivered > 0 {
                        report.partial += 1;
                        report.delivered += delivered;
                    }
                }
                Ok(SettleOutcome::Unchanged) => {}
                Err(e) => {
                    report.failed += 1;
                    error!(purchase_id = %id, error = %e, "Failed to settle underdelivered purchase");
                }
            }
        }

        info!(
            attempted = report.attempted,
            finalized = report.finalized,
            partial = report.partial,
            delivered = report.delivered,
            failed = report.failed,
            "Replenishment sweep finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Apply a payment provider's notice.
    ///
    /// # Errors
    ///
    /// - `EngineError::NotFound` if ID and payment key do not match a
    ///   purchase.
    /// - `EngineError::Transition` if the event does not apply to the
    ///   purchase's status.
    /// - Any settlement error.
    #[instrument(skip(self, notice), fields(purchase_id = %notice.purchase_id, event = %notice.event))]
    pub async fn handle_payment_event(
        &self,
        notice: &PaymentNotice,
    ) -> Result<PaymentOutcome, EngineError> {
        let purchase = self
            .store
            .purchase_by_payment_key(&notice.purchase_id, &notice.payment_key)
            .await?
            .ok_or(EngineError::NotFound)?;
        let id = &purchase.id;

        let transition =
            purchase
                .status
                .on_event(notice.event)
                .map_err(|source| EngineError::Transition {
                    id: id.clone(),
                    source,
                })?;

        match transition {
            Transition::MarkProcessing => {
                let moved = self
                    .move_status(id, PurchaseStatus::PaymentProcessing)
                    .await?;
                Ok(if moved {
                    PaymentOutcome::Processing
                } else {
                    PaymentOutcome::Ignored
                })
            }
            Transition::Expire => {
                let moved = self.move_status(id, PurchaseStatus::Expired).await?;
                Ok(if moved {
                    PaymentOutcome::Expired
                } else {
                    PaymentOutcome::Ignored
                })
            }
            Transition::Settle => Ok(PaymentOutcome::Settled(self.settle_paid(id).await?)),
            Transition::Ignore => {
                debug!("Payment event already applied");
                Ok(PaymentOutcome::Ignored)
            }
        }
    }

    /// Staff confirmation of a payment that arrived outside any webhook
    /// (bank transfer).
    ///
    /// # Errors
    ///
    /// Same as [`Self::settle`].
    #[instrument(skip(self, id), fields(purchase_id = %id))]
    pub async fn confirm_payment(&self, id: &PurchaseId) -> Result<SettleOutcome, EngineError> {
        info!("Payment confirmed by staff");
        self.settle_paid(id).await
    }

    /// Settle and tell the customer, unless a repeated payment event left
    /// an underdelivered purchase as it was.
    async fn settle_paid(&self, id: &PurchaseId) -> Result<SettleOutcome, EngineError> {
        let before = self
            .store
            .purchase_by_id(id)
            .await?
            .ok_or(EngineError::NotFound)?
            .status;
        let outcome = self.settle(id).await?;
        let changed = match outcome {
            SettleOutcome::Unchanged => false,
            SettleOutcome::Finalized { .. } => true,
            SettleOutcome::Underdelivered { delivered, .. } => {
                delivered > 0 || before != PurchaseStatus::Underdelivered
            }
        };
        if changed {
            self.notify(id, Notification::payment_received).await;
        } else {
            debug!("Settlement changed nothing, customer not notified");
        }
        Ok(outcome)
    }

    /// Move an unpaid purchase out of `new` and keep it for another
    /// retention period.
    async fn move_status(&self, id: &PurchaseId, to: PurchaseStatus) -> Result<bool, EngineError> {
        let delete_date = delete_date_after(self.clock.today());
        let moved = self
            .store
            .transition_status(id, PurchaseStatus::New, to, Some(delete_date))
            .await?;
        if moved {
            info!(purchase_id = %id, status = %to, "Purchase status changed");
        } else {
            debug!(purchase_id = %id, status = %to, "Purchase left new concurrently");
        }
        Ok(moved)
    }

    /// Creation date, for payment providers.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if ID and payment key do not match.
    pub async fn purchase_creation_date(
        &self,
        id: &PurchaseId,
        payment_key: &PaymentKey,
    ) -> Result<NaiveDate, EngineError> {
        Ok(self.purchase_for_payment(id, payment_key).await?.create_date)
    }

    /// Order total, for payment providers.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if ID and payment key do not match.
    pub async fn purchase_sum_cents(
        &self,
        id: &PurchaseId,
        payment_key: &PaymentKey,
    ) -> Result<Cents, EngineError> {
        Ok(self.purchase_for_payment(id, payment_key).await?.sum())
    }

    async fn purchase_for_payment(
        &self,
        id: &PurchaseId,
        payment_key: &PaymentKey,
    ) -> Result<Purchase, EngineError> {
        self.store
            .purchase_by_payment_key(id, payment_key)
            .await?
            .ok_or(EngineError::NotFound)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Notify the purchase's customer, if they asked for it.
    ///
    /// Failures are logged. After a successful notification about a
    /// finalized purchase the target is forgotten.
    async fn notify(&self, id: &PurchaseId, compose: fn(&Purchase) -> Notification) {
        let purchase = match self.store.purchase_by_id(id).await {
            Ok(Some(purchase)) => purchase,
            Ok(None) => return,
            Err(e) => {
                warn!(purchase_id = %id, error = %e, "Cannot load purchase for notification");
                return;
            }
        };
        let Some(target) = purchase.notify.as_ref() else {
            return;
        };

        if let Err(e) = self.notifier.send(target, &compose(&purchase)).await {
            warn!(purchase_id = %id, proto = %target.proto, error = %e, "Notification failed");
            return;
        }
        info!(purchase_id = %id, proto = %target.proto, "Customer notified");

        if purchase.status == PurchaseStatus::Finalized
            && let Err(e) = self.store.set_notify(id, None).await
        {
            warn!(purchase_id = %id, error = %e, "Failed to clear notify target");
        }
    }

    // =========================================================================
    // Customer settings
    // =========================================================================

    /// Set or clear the customer's notify target.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for a wrong ID or access key and
    /// `EngineError::Notify` for an invalid target.
    #[instrument(skip(self, id, access_key, addr), fields(purchase_id = %id))]
    pub async fn set_notify(
        &self,
        id: &PurchaseId,
        access_key: &AccessKey,
        proto: Option<&str>,
        addr: &str,
    ) -> Result<Option<Notify>, EngineError> {
        let purchase = self.purchase(id, access_key).await?;
        let notify = Notify::parse(proto, addr)?;
        self.store
            .set_notify(&purchase.id, notify.as_ref())
            .await?;
        info!(enabled = notify.is_some(), "Notify target updated");
        Ok(notify)
    }

    /// Change the tax country of an unpaid purchase.
    ///
    /// # Errors
    ///
    /// - `EngineError::Order` for an invalid tax country.
    /// - `EngineError::NotFound` if the purchase does not exist.
    /// - `EngineError::CountryLocked` once payment has been received.
    #[instrument(skip(self, id), fields(purchase_id = %id))]
    pub async fn set_country(
        &self,
        id: &PurchaseId,
        country: &CountryId,
    ) -> Result<(), EngineError> {
        if !country.is_valid_tax_country() {
            return Err(OrderError::InvalidTaxCountry(country.clone()).into());
        }
        if self.store.set_country(id, country).await? {
            info!(country = %country, "Tax country changed");
            return Ok(());
        }
        match self.store.purchase_by_id(id).await? {
            Some(_) => Err(EngineError::CountryLocked(id.clone())),
            None => Err(EngineError::NotFound),
        }
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Add items to the ledger, then run the replenishment sweep.
    ///
    /// # Errors
    ///
    /// - `EngineError::UnknownVariant` if the variant is not in the catalog.
    /// - `EngineError::Order` if the variant is not sold for the country.
    #[instrument(skip(self, key, payloads), fields(variant = %key.variant_id, country = %key.country_id, count = payloads.len()))]
    pub async fn add_to_stock(
        &self,
        key: &StockKey,
        payloads: Vec<StockPayload>,
    ) -> Result<StockUpload, EngineError> {
        let variant = self
            .catalog
            .variant(&key.variant_id)
            .ok_or_else(|| EngineError::UnknownVariant(key.variant_id.clone()))?;
        if !variant.accepts_country(&key.country_id) {
            return Err(OrderError::CountryNotAvailable {
                variant: key.variant_id.clone(),
                country: key.country_id.clone(),
            }
            .into());
        }

        let added = payloads.len();
        for payload in &payloads {
            self.store.add_item(key, payload).await?;
        }
        info!(added, "Added stock");

        let sweep = self.fulfil_underdelivered().await?;
        Ok(StockUpload { added, sweep })
    }

    /// Add a whitespace-separated list of codes.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_to_stock`].
    pub async fn add_codes(&self, key: &StockKey, codes: &str) -> Result<StockUpload, EngineError> {
        let payloads = codes
            .split_whitespace()
            .map(|code| StockPayload::Code(code.to_string()))
            .collect();
        self.add_to_stock(key, payloads).await
    }

    /// Stock per key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn stock_counts(&self) -> Result<StockCounts, EngineError> {
        Ok(self.store.count_all().await?)
    }

    /// Stock of one variant per country.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn variant_stock(&self, variant: &VariantId) -> Result<StockCounts, EngineError> {
        Ok(self.store.count_by_variant(variant).await?)
    }

    /// Units owed to underdelivered purchases next to the stock, per key.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Inconsistency` for the first underdelivered
    /// purchase whose delivery does not fit its order.
    pub async fn underdelivered_overview(&self) -> Result<Vec<OverviewRow>, EngineError> {
        let ids = self
            .store
            .ids_by_status(PurchaseStatus::Underdelivered)
            .await?;

        let mut unfulfilled = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(purchase) = self.store.purchase_by_id(id).await? else {
                continue;
            };
            unfulfilled.push(
                purchase
                    .unfulfilled()
                    .map_err(|source| inconsistency(id, source))?,
            );
        }

        let stock = self.store.count_all().await?;
        let totals: BTreeMap<StockKey, u32> = total_unfulfilled(&unfulfilled);
        Ok(totals
            .into_iter()
            .map(|(key, unfulfilled)| OverviewRow {
                in_stock: stock.get(&key),
                key,
                unfulfilled,
            })
            .collect())
    }

    // =========================================================================
    // Lookups and maintenance
    // =========================================================================

    /// A purchase as seen by its customer.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for a wrong ID or access key.
    pub async fn purchase(
        &self,
        id: &PurchaseId,
        access_key: &AccessKey,
    ) -> Result<Purchase, EngineError> {
        self.store
            .purchase_by_access_key(id, access_key)
            .await?
            .ok_or(EngineError::NotFound)
    }

    /// A purchase as seen by staff.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if there is no such purchase.
    pub async fn purchase_by_id(&self, id: &PurchaseId) -> Result<Purchase, EngineError> {
        self.store
            .purchase_by_id(id)
            .await?
            .ok_or(EngineError::NotFound)
    }

    /// Purchase IDs containing `fragment`, for staff search.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn find_ids(&self, fragment: &str) -> Result<Vec<PurchaseId>, EngineError> {
        let fragment = PurchaseId::normalize(fragment);
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.ids_like(fragment.as_str()).await?)
    }

    /// Remove purchases past their delete date.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> Result<u64, EngineError> {
        let removed = self.store.cleanup(self.clock.today()).await?;
        info!(count = removed, "Cleaned up purchases");
        Ok(removed)
    }
}

fn inconsistency(id: &PurchaseId, source: FulfilmentError) -> EngineError {
    error!(purchase_id = %id, error = %source, "Purchase data is inconsistent");
    EngineError::Inconsistency {
        id: id.clone(),
        source,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use voucher_store_core::{Article, Variant};

    use super::*;
    use crate::db::{MemoryStore, StockLedger};
    use crate::services::clock::FixedClock;
    use crate::services::ids::RandomIds;
    use crate::services::notify::NoopNotifier;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog {
            articles: vec![Article {
                id: "gift".to_string(),
                brand: "Example".to_string(),
                name: "Gift card".to_string(),
                hide: false,
                variants: vec![Variant {
                    id: VariantId::new("gift-10"),
                    name: "10 EUR".to_string(),
                    price: Cents::new(1000),
                    has_country: false,
                    on_demand: false,
                    warn_stock: 0,
                }],
            }],
        }
    }

    fn engine(store: &MemoryStore) -> FulfilmentEngine {
        FulfilmentEngine::new(
            Arc::new(store.clone()),
            Arc::new(catalog()),
            Arc::new(FixedClock::new(today())),
            Arc::new(RandomIds),
            Arc::new(NoopNotifier),
        )
    }

    fn key() -> StockKey {
        StockKey::new("gift-10", "all")
    }

    #[tokio::test]
    async fn test_settle_unknown_purchase() {
        let store = MemoryStore::new();
        let result = engine(&store).settle(&PurchaseId::new("NOPE23")).await;
        assert!(matches!(result, Err(EngineError::NotFound)));
    }

    #[tokio::test]
    async fn test_settle_delivers_and_finalizes() {
        let store = MemoryStore::new();
        store
            .add_item(&key(), &StockPayload::Code("CODE-1".into()))
            .await
            .unwrap();
        let engine = engine(&store);

        let purchase = engine
            .insert_purchase(OrderRequest {
                items: vec![(key(), 1)],
                country_code: CountryId::new("DE"),
                notify: None,
            })
            .await
            .unwrap();

        let outcome = engine.settle(&purchase.id).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Finalized { delivered: 1 });
        assert_eq!(
            engine.settle(&purchase.id).await.unwrap(),
            SettleOutcome::Unchanged
        );
        assert_eq!(store.vat_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_codes_rejects_country_for_global_variant() {
        let store = MemoryStore::new();
        let result = engine(&store)
            .add_codes(&StockKey::new("gift-10", "DE"), "A B")
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Order(OrderError::CountryNotAvailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_add_codes_unknown_variant() {
        let store = MemoryStore::new();
        let result = engine(&store)
            .add_codes(&StockKey::new("nope", "all"), "A")
            .await;
        assert!(matches!(result, Err(EngineError::UnknownVariant(_))));
    }

    #[tokio::test]
    async fn test_find_ids_normalizes() {
        let store = MemoryStore::new();
        assert!(engine(&store).find_ids("  ").await.unwrap().is_empty());
    }
}
