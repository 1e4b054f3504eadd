//! Stock ledger commands.
//!
//! # Usage
//!
//! ```bash
//! vs-cli stock add gift-10 CODE-1 CODE-2
//! vs-cli stock add sim-de --country DE --file codes.txt
//! vs-cli stock add gift-25 --image card-1.png --image card-2.png
//! vs-cli stock count --variant sim-de
//! vs-cli stock overview
//! ```

use std::path::{Path, PathBuf};

use voucher_store_core::{StockKey, StockPayload, VariantId};

use super::{CommandError, engine_from_env};

/// Add codes or images, then deliver to waiting purchases.
///
/// # Errors
///
/// Returns an error if nothing was given, a file cannot be read, the
/// variant or country is invalid, or the store fails.
pub async fn add(
    variant: &str,
    country: &str,
    file: Option<&Path>,
    images: &[PathBuf],
    codes: &[String],
) -> Result<(), CommandError> {
    let payloads = read_payloads(file, images, codes).await?;

    let engine = engine_from_env().await?;
    let key = StockKey::new(variant, country);
    let upload = engine.add_to_stock(&key, payloads).await?;

    tracing::info!(
        variant,
        country,
        added = upload.added,
        finalized = upload.sweep.finalized,
        failed = upload.sweep.failed,
        "Stock added"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("Added {} item(s) to {key}", upload.added);
        println!(
            "Delivered {} unit(s): {} purchase(s) finalized, {} partially delivered, {} failed",
            upload.sweep.delivered,
            upload.sweep.finalized,
            upload.sweep.partial,
            upload.sweep.failed
        );
    }
    Ok(())
}

/// Print stock per key, flagging variants below their warning level.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn count(variant: Option<&str>) -> Result<(), CommandError> {
    let engine = engine_from_env().await?;
    let counts = match variant {
        Some(variant) => engine.variant_stock(&VariantId::new(variant)).await?,
        None => engine.stock_counts().await?,
    };

    let mut rows: Vec<(&StockKey, u32)> = counts.iter().collect();
    rows.sort();

    #[allow(clippy::print_stdout)]
    {
        for (key, count) in rows {
            println!("{:<24} {:<8} {count:>6}", key.variant_id, key.country_id);
        }
        for catalog_variant in engine.catalog().variants() {
            if variant.is_some_and(|v| v != catalog_variant.id.as_str()) {
                continue;
            }
            let in_stock = counts.for_variant(&catalog_variant.id);
            if in_stock < catalog_variant.warn_stock {
                println!(
                    "LOW STOCK: {} has {in_stock} (warn below {})",
                    catalog_variant.id, catalog_variant.warn_stock
                );
            }
        }
    }
    Ok(())
}

/// Print units owed to underdelivered purchases next to the stock.
///
/// # Errors
///
/// Returns an error if the store fails or an underdelivered purchase is
/// inconsistent.
pub async fn overview() -> Result<(), CommandError> {
    let engine = engine_from_env().await?;
    let rows = engine.underdelivered_overview().await?;

    #[allow(clippy::print_stdout)]
    {
        if rows.is_empty() {
            println!("No underdelivered purchases");
        }
        for row in rows {
            println!(
                "{:<24} {:<8} owed {:>6}  in stock {:>6}",
                row.key.variant_id, row.key.country_id, row.unfulfilled, row.in_stock
            );
        }
    }
    Ok(())
}

/// One payload per image file, or per whitespace-separated code from the
/// file or the arguments.
async fn read_payloads(
    file: Option<&Path>,
    images: &[PathBuf],
    codes: &[String],
) -> Result<Vec<StockPayload>, CommandError> {
    let mut payloads = Vec::new();
    if images.is_empty() {
        let text = match file {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => codes.join(" "),
        };
        payloads.extend(
            text.split_whitespace()
                .map(|code| StockPayload::Code(code.to_string())),
        );
    } else {
        for path in images {
            let bytes = tokio::fs::read(path).await?;
            if bytes.is_empty() {
                return Err(CommandError::InvalidArgument(format!(
                    "{} is empty",
                    path.display()
                )));
            }
            payloads.push(StockPayload::Image(bytes));
        }
    }

    if payloads.is_empty() {
        return Err(CommandError::InvalidArgument(
            "no codes or images given".to_string(),
        ));
    }
    Ok(payloads)
}
