//! `PostgreSQL` backend.
//!
//! Uses runtime queries to avoid `SQLx` offline mode cache requirements.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use voucher_store_core::{
    AccessKey, CountryId, Delivery, Notify, NotifyProto, Order, PaymentKey, Purchase, PurchaseId,
    PurchaseStatus, StockCounts, StockItem, StockItemId, StockKey, StockPayload, VariantId,
    VatEntry,
};

use super::{PurchaseRepository, RepositoryError, SettleTx, StockLedger, Store};

const PURCHASE_COLUMNS: &str = "id, access_key, payment_key, status, ordered, delivered, \
     country_code, notify_proto, notify_addr, create_date, delete_date";

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for purchase queries.
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: String,
    access_key: String,
    payment_key: String,
    status: PurchaseStatus,
    ordered: String,
    delivered: String,
    country_code: String,
    notify_proto: Option<NotifyProto>,
    notify_addr: Option<String>,
    create_date: NaiveDate,
    delete_date: Option<NaiveDate>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = RepositoryError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let ordered: Order = serde_json::from_str(&row.ordered).map_err(|e| {
            RepositoryError::DataCorruption(format!("purchase {}: invalid ordered: {e}", row.id))
        })?;
        let delivered: Delivery = serde_json::from_str(&row.delivered).map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "purchase {}: invalid delivered (run `vs-cli migrate-legacy`?): {e}",
                row.id
            ))
        })?;
        let notify = match (row.notify_proto, row.notify_addr) {
            (Some(proto), Some(addr)) => Some(Notify { proto, addr }),
            _ => None,
        };

        Ok(Self {
            id: PurchaseId::new(row.id),
            access_key: AccessKey::new(row.access_key),
            payment_key: PaymentKey::new(row.payment_key),
            status: row.status,
            ordered,
            delivered,
            country_code: CountryId::new(row.country_code),
            notify,
            create_date: row.create_date,
            delete_date: row.delete_date,
        })
    }
}

/// Internal row type for stock item queries.
#[derive(Debug, sqlx::FromRow)]
struct StockItemRow {
    id: i64,
    variant_id: String,
    country_id: String,
    payload: String,
    added_at: DateTime<Utc>,
}

impl TryFrom<StockItemRow> for StockItem {
    type Error = RepositoryError;

    fn try_from(row: StockItemRow) -> Result<Self, Self::Error> {
        let payload: StockPayload = serde_json::from_str(&row.payload).map_err(|e| {
            RepositoryError::DataCorruption(format!("stock item {}: invalid payload: {e}", row.id))
        })?;
        Ok(Self {
            id: StockItemId::new(row.id),
            key: StockKey::new(row.variant_id, row.country_id),
            payload,
            added_at: row.added_at,
        })
    }
}

/// Internal row type for stock count queries.
#[derive(Debug, sqlx::FromRow)]
struct StockCountRow {
    variant_id: String,
    country_id: String,
    count: i64,
}

impl From<StockCountRow> for (StockKey, u32) {
    fn from(row: StockCountRow) -> Self {
        (
            StockKey::new(row.variant_id, row.country_id),
            u32::try_from(row.count).unwrap_or(u32::MAX),
        )
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("cannot encode JSON: {e}")))
}

fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL` implementation of [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store on top of a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PurchaseRepository for PgStore {
    async fn insert_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let ordered = to_json(&purchase.ordered)?;
        let delivered = to_json(&purchase.delivered)?;

        sqlx::query(
            r"
            INSERT INTO shop.purchase
                (id, access_key, payment_key, status, ordered, delivered,
                 country_code, notify_proto, notify_addr, create_date, delete_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(purchase.id.as_str())
        .bind(purchase.access_key.as_str())
        .bind(purchase.payment_key.as_str())
        .bind(purchase.status)
        .bind(ordered)
        .bind(delivered)
        .bind(purchase.country_code.as_str())
        .bind(purchase.notify.as_ref().map(|n| n.proto))
        .bind(purchase.notify.as_ref().map(|n| n.addr.as_str()))
        .bind(purchase.create_date)
        .bind(purchase.delete_date)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("purchase ID or key already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }

    async fn purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM shop.purchase WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn purchase_by_access_key(
        &self,
        id: &PurchaseId,
        access_key: &AccessKey,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM shop.purchase WHERE id = $1 AND access_key = $2"
        ))
        .bind(id.as_str())
        .bind(access_key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn purchase_by_payment_key(
        &self,
        id: &PurchaseId,
        payment_key: &PaymentKey,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM shop.purchase WHERE id = $1 AND payment_key = $2"
        ))
        .bind(id.as_str())
        .bind(payment_key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn ids_by_status(
        &self,
        status: PurchaseStatus,
    ) -> Result<Vec<PurchaseId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, String>(
            r"
            SELECT id FROM shop.purchase
            WHERE status = $1
            ORDER BY create_date, id
            ",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(PurchaseId::new).collect())
    }

    async fn ids_like(&self, fragment: &str) -> Result<Vec<PurchaseId>, RepositoryError> {
        let pattern = format!("%{}%", escape_like(fragment));
        let ids = sqlx::query_scalar::<_, String>(
            r"
            SELECT id FROM shop.purchase
            WHERE id ILIKE $1
            ORDER BY id
            LIMIT 50
            ",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(PurchaseId::new).collect())
    }

    async fn transition_status(
        &self,
        id: &PurchaseId,
        from: PurchaseStatus,
        to: PurchaseStatus,
        delete_date: Option<NaiveDate>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.purchase
            SET status = $3, delete_date = $4
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id.as_str())
        .bind(from)
        .bind(to)
        .bind(delete_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_notify(
        &self,
        id: &PurchaseId,
        notify: Option<&Notify>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.purchase
            SET notify_proto = $2, notify_addr = $3
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(notify.map(|n| n.proto))
        .bind(notify.map(|n| n.addr.as_str()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_country(
        &self,
        id: &PurchaseId,
        country: &CountryId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.purchase
            SET country_code = $2
            WHERE id = $1 AND status = 'new'
            ",
        )
        .bind(id.as_str())
        .bind(country.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cleanup(&self, today: NaiveDate) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM shop.purchase
            WHERE delete_date < $1
              AND status IN ('new', 'expired', 'finalized')
            ",
        )
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StockLedger for PgStore {
    async fn add_item(
        &self,
        key: &StockKey,
        payload: &StockPayload,
    ) -> Result<StockItemId, RepositoryError> {
        let id = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO shop.stock_item (variant_id, country_id, payload, added_at)
            VALUES ($1, $2, $3, now())
            RETURNING id
            ",
        )
        .bind(key.variant_id.as_str())
        .bind(key.country_id.as_str())
        .bind(to_json(payload)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(StockItemId::new(id))
    }

    async fn count_by_variant(&self, variant: &VariantId) -> Result<StockCounts, RepositoryError> {
        let rows = sqlx::query_as::<_, StockCountRow>(
            r"
            SELECT variant_id, country_id, COUNT(*) AS count
            FROM shop.stock_item
            WHERE variant_id = $1
            GROUP BY variant_id, country_id
            ",
        )
        .bind(variant.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(StockCounts::from_rows(rows.into_iter().map(Into::into)))
    }

    async fn count_all(&self) -> Result<StockCounts, RepositoryError> {
        let rows = sqlx::query_as::<_, StockCountRow>(
            r"
            SELECT variant_id, country_id, COUNT(*) AS count
            FROM shop.stock_item
            GROUP BY variant_id, country_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(StockCounts::from_rows(rows.into_iter().map(Into::into)))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn SettleTx>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSettleTx { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Settlement Transaction
// =============================================================================

/// A settlement transaction. Rolled back on drop unless committed.
struct PgSettleTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SettleTx for PgSettleTx {
    async fn lock_purchase(
        &mut self,
        id: &PurchaseId,
    ) -> Result<Option<Purchase>, RepositoryError> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM shop.purchase WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn withdraw_oldest(
        &mut self,
        key: &StockKey,
        max: u32,
    ) -> Result<Vec<StockItem>, RepositoryError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, StockItemRow>(
            r"
            DELETE FROM shop.stock_item
            WHERE id IN (
                SELECT id FROM shop.stock_item
                WHERE variant_id = $1 AND country_id = $2
                ORDER BY added_at, id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, variant_id, country_id, payload, added_at
            ",
        )
        .bind(key.variant_id.as_str())
        .bind(key.country_id.as_str())
        .bind(i64::from(max))
        .fetch_all(&mut *self.tx)
        .await?;

        // RETURNING order is unspecified
        let mut items = rows
            .into_iter()
            .map(StockItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        items.sort_by_key(|item| (item.added_at, item.id));
        Ok(items)
    }

    async fn log_vat(&mut self, entries: &[VatEntry]) -> Result<(), RepositoryError> {
        for entry in entries {
            sqlx::query(
                r"
                INSERT INTO shop.vat_log
                    (purchase_id, delivery_date, variant_id, country_id, item_price, purchase_country)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(entry.purchase_id.as_str())
            .bind(entry.delivery_date)
            .bind(entry.variant_id.as_str())
            .bind(entry.country_id.as_str())
            .bind(entry.item_price.as_i64())
            .bind(entry.purchase_country.as_str())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn save_settlement(&mut self, purchase: &Purchase) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.purchase
            SET status = $2, delivered = $3, delete_date = $4
            WHERE id = $1
            ",
        )
        .bind(purchase.id.as_str())
        .bind(purchase.status)
        .bind(to_json(&purchase.delivered)?)
        .bind(purchase.delete_date)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("AB%_\\"), "AB\\%\\_\\\\");
        assert_eq!(escape_like("ABC"), "ABC");
    }

    #[test]
    fn test_row_with_legacy_delivery_is_corrupt() {
        let row = PurchaseRow {
            id: "ABC123".to_string(),
            access_key: "a".to_string(),
            payment_key: "p".to_string(),
            status: PurchaseStatus::Finalized,
            ordered: "[]".to_string(),
            delivered: r#"[{"article-id":"x","id":"CODE","delivery-date":"2021-01-01"}]"#
                .to_string(),
            country_code: "DE".to_string(),
            notify_proto: None,
            notify_addr: None,
            create_date: NaiveDate::MIN,
            delete_date: None,
        };
        assert!(matches!(
            Purchase::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_count_row_conversion() {
        let row = StockCountRow {
            variant_id: "sim".to_string(),
            country_id: "DE".to_string(),
            count: 3,
        };
        let (key, count): (StockKey, u32) = row.into();
        assert_eq!(key, StockKey::new("sim", "DE"));
        assert_eq!(count, 3);
    }
}
