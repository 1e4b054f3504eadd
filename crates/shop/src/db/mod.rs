//! Persistence for purchases, the stock ledger and the VAT log.
//!
//! # Backends
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx (production)
//! - [`MemoryStore`] - process-local store with the same semantics (tests,
//!   local demo mode)
//!
//! # Tables
//!
//! - `purchase` - one row per purchase; `ordered` and `delivered` are JSON text
//! - `stock_item` - unsold inventory, withdrawn oldest first
//! - `vat_log` - one row per delivered unit, never deleted
//!
//! # Migrations
//!
//! Migrations are stored in `crates/shop/migrations/` and run via:
//! ```bash
//! cargo run -p voucher-store-cli -- migrate
//! ```
//!
//! # Transactions
//!
//! Settlement runs through [`SettleTx`]. Dropping a transaction without
//! calling [`SettleTx::commit`] rolls it back.

pub mod legacy;
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use voucher_store_core::{
    AccessKey, CountryId, Notify, PaymentKey, Purchase, PurchaseId, PurchaseStatus, StockCounts,
    StockItem, StockItemId, StockKey, StockPayload, VariantId, VatEntry,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate purchase ID).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Purchase rows outside of settlement.
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Insert a new purchase.
    ///
    /// Returns `RepositoryError::Conflict` if the ID, access key or payment
    /// key is already taken.
    async fn insert_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError>;

    /// Look up a purchase by ID only (staff access).
    async fn purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, RepositoryError>;

    /// Look up a purchase by ID and access key (customer access).
    async fn purchase_by_access_key(
        &self,
        id: &PurchaseId,
        access_key: &AccessKey,
    ) -> Result<Option<Purchase>, RepositoryError>;

    /// Look up a purchase by ID and payment key (payment provider access).
    async fn purchase_by_payment_key(
        &self,
        id: &PurchaseId,
        payment_key: &PaymentKey,
    ) -> Result<Option<Purchase>, RepositoryError>;

    /// IDs of all purchases in a status, oldest first.
    async fn ids_by_status(
        &self,
        status: PurchaseStatus,
    ) -> Result<Vec<PurchaseId>, RepositoryError>;

    /// IDs containing `fragment` (case-insensitive), for staff search.
    async fn ids_like(&self, fragment: &str) -> Result<Vec<PurchaseId>, RepositoryError>;

    /// Move a purchase from `from` to `to` and set its delete date.
    ///
    /// Returns `false` if the purchase was not in status `from` (anymore).
    async fn transition_status(
        &self,
        id: &PurchaseId,
        from: PurchaseStatus,
        to: PurchaseStatus,
        delete_date: Option<NaiveDate>,
    ) -> Result<bool, RepositoryError>;

    /// Replace the notify target.
    async fn set_notify(
        &self,
        id: &PurchaseId,
        notify: Option<&Notify>,
    ) -> Result<(), RepositoryError>;

    /// Change the tax country while the purchase is unpaid.
    ///
    /// Returns `false` if the purchase is no longer `new`.
    async fn set_country(
        &self,
        id: &PurchaseId,
        country: &CountryId,
    ) -> Result<bool, RepositoryError>;

    /// Delete `new`, `expired` and `finalized` purchases whose delete date is
    /// before `today`. Returns the number of deleted purchases.
    async fn cleanup(&self, today: NaiveDate) -> Result<u64, RepositoryError>;
}

/// The stock ledger outside of settlement.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Add one item with the current timestamp.
    async fn add_item(
        &self,
        key: &StockKey,
        payload: &StockPayload,
    ) -> Result<StockItemId, RepositoryError>;

    /// Stock per country for one variant.
    async fn count_by_variant(&self, variant: &VariantId) -> Result<StockCounts, RepositoryError>;

    /// Stock per (variant, country) for everything.
    async fn count_all(&self) -> Result<StockCounts, RepositoryError>;
}

/// One settlement transaction.
#[async_trait]
pub trait SettleTx: Send {
    /// Load a purchase and lock it until commit or rollback.
    async fn lock_purchase(&mut self, id: &PurchaseId)
    -> Result<Option<Purchase>, RepositoryError>;

    /// Remove and return up to `max` of the oldest items for `key`.
    ///
    /// Items are returned oldest first. Fewer than `max` is not an error.
    /// Items locked by a concurrent settlement are skipped even if that
    /// settlement later rolls back; the periodic replenishment sweep picks
    /// up what was missed.
    async fn withdraw_oldest(
        &mut self,
        key: &StockKey,
        max: u32,
    ) -> Result<Vec<StockItem>, RepositoryError>;

    /// Append VAT log rows.
    async fn log_vat(&mut self, entries: &[VatEntry]) -> Result<(), RepositoryError>;

    /// Persist status, delivery and delete date of a settled purchase.
    async fn save_settlement(&mut self, purchase: &Purchase) -> Result<(), RepositoryError>;

    /// Commit all changes.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// A complete backend.
#[async_trait]
pub trait Store: PurchaseRepository + StockLedger {
    /// Start a settlement transaction.
    async fn begin(&self) -> Result<Box<dyn SettleTx>, RepositoryError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
