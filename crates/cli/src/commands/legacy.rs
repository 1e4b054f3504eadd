//! One-time upgrade of purchases stored before per-country stock.
//!
//! # Usage
//!
//! ```bash
//! # See what would change
//! vs-cli migrate-legacy --map sim-de=DE --map sim-at=AT --dry-run
//!
//! # Rewrite
//! vs-cli migrate-legacy --map sim-de=DE --map sim-at=AT
//! ```
//!
//! Delivered items and order lines without a country ID get the mapped
//! country of their variant, or `all`.

use secrecy::ExposeSecret;
use sqlx::PgPool;

use voucher_store_core::legacy::LegacyCountryMap;
use voucher_store_shop::config::get_database_url;
use voucher_store_shop::db::PgStore;
use voucher_store_shop::db::legacy::migrate_legacy_purchases;

use super::CommandError;

/// Run the legacy migration.
///
/// # Errors
///
/// Returns an error for a malformed mapping, a blob that is neither legacy
/// nor current, or a database failure. Nothing is written on error.
pub async fn run(maps: &[String], dry_run: bool) -> Result<(), CommandError> {
    dotenvy::dotenv().ok();

    let map = LegacyCountryMap::from_pairs(maps.iter().map(String::as_str))
        .map_err(CommandError::InvalidArgument)?;

    let database_url = get_database_url()?;
    tracing::info!("Connecting to database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    let report = migrate_legacy_purchases(&PgStore::new(pool), &map, dry_run).await?;

    #[allow(clippy::print_stdout)]
    {
        let verb = if dry_run { "would rewrite" } else { "rewrote" };
        println!(
            "Scanned {} purchase(s), {verb} {} ({} entries upgraded)",
            report.scanned, report.rewritten, report.upgraded_entries
        );
    }
    Ok(())
}
