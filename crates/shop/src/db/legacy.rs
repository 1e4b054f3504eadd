//! One-time rewrite of purchases stored in the pre-country JSON shape.
//!
//! Reads `ordered` and `delivered` as raw text so that rows the runtime would
//! reject as corrupt can still be upgraded.

use tracing::{info, instrument, warn};

use voucher_store_core::legacy::{LegacyCountryMap, migrate_delivery, migrate_order};

use super::{PgStore, RepositoryError};

/// Result of a legacy migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyReport {
    /// Purchases looked at.
    pub scanned: usize,
    /// Purchases rewritten.
    pub rewritten: usize,
    /// Order lines and delivered items that were upgraded.
    pub upgraded_entries: usize,
}

#[derive(Debug, sqlx::FromRow)]
struct BlobRow {
    id: String,
    ordered: String,
    delivered: String,
}

/// Upgrade every purchase in one transaction.
///
/// With `dry_run` nothing is written; the report shows what would change.
///
/// # Errors
///
/// Returns `RepositoryError::DataCorruption` for a blob that matches neither
/// the current nor the legacy shape. Nothing is written in that case.
#[instrument(skip(store, map))]
pub async fn migrate_legacy_purchases(
    store: &PgStore,
    map: &LegacyCountryMap,
    dry_run: bool,
) -> Result<LegacyReport, RepositoryError> {
    let mut tx = store.pool().begin().await?;

    let rows = sqlx::query_as::<_, BlobRow>(
        r"
        SELECT id, ordered, delivered
        FROM shop.purchase
        ORDER BY id
        FOR UPDATE
        ",
    )
    .fetch_all(&mut *tx)
    .await?;

    let mut report = LegacyReport {
        scanned: rows.len(),
        ..LegacyReport::default()
    };

    for row in rows {
        let ordered = migrate_order(&row.ordered, map).map_err(|e| {
            RepositoryError::DataCorruption(format!("purchase {}: ordered: {e}", row.id))
        })?;
        let delivered = migrate_delivery(&row.delivered, map).map_err(|e| {
            RepositoryError::DataCorruption(format!("purchase {}: delivered: {e}", row.id))
        })?;

        let upgraded = ordered.upgraded + delivered.upgraded;
        if upgraded == 0 {
            continue;
        }

        if let Err(e) = voucher_store_core::Unfulfilled::compute(&ordered.value, &delivered.value)
        {
            warn!(purchase_id = %row.id, error = %e, "Upgraded purchase will fail settlement");
        }

        report.rewritten += 1;
        report.upgraded_entries += upgraded;
        info!(purchase_id = %row.id, upgraded, "Upgrading legacy purchase");

        if dry_run {
            continue;
        }

        let ordered_json = serde_json::to_string(&ordered.value)
            .map_err(|e| RepositoryError::DataCorruption(format!("cannot encode JSON: {e}")))?;
        let delivered_json = serde_json::to_string(&delivered.value)
            .map_err(|e| RepositoryError::DataCorruption(format!("cannot encode JSON: {e}")))?;

        sqlx::query(
            r"
            UPDATE shop.purchase
            SET ordered = $2, delivered = $3
            WHERE id = $1
            ",
        )
        .bind(&row.id)
        .bind(ordered_json)
        .bind(delivered_json)
        .execute(&mut *tx)
        .await?;
    }

    if dry_run {
        tx.rollback().await?;
    } else {
        tx.commit().await?;
    }

    info!(
        scanned = report.scanned,
        rewritten = report.rewritten,
        upgraded_entries = report.upgraded_entries,
        dry_run,
        "Legacy migration finished"
    );
    Ok(report)
}
