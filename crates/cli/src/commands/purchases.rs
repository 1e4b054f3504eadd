//! Purchase maintenance commands.

use voucher_store_core::{PurchaseId, SettleOutcome};

use super::{CommandError, engine_from_env};

/// Run the replenishment sweep.
///
/// # Errors
///
/// Returns an error if underdelivered purchases cannot be listed.
pub async fn fulfil() -> Result<(), CommandError> {
    let engine = engine_from_env().await?;
    let report = engine.fulfil_underdelivered().await?;

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{} underdelivered purchase(s): {} finalized, {} partially delivered, {} failed",
            report.attempted, report.finalized, report.partial, report.failed
        );
    }
    Ok(())
}

/// Run the cleanup sweep.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn cleanup() -> Result<(), CommandError> {
    let engine = engine_from_env().await?;
    let removed = engine.cleanup().await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Removed {removed} purchase(s)");
    }
    Ok(())
}

/// Confirm a payment and deliver.
///
/// # Errors
///
/// Returns an error if the purchase does not exist, cannot be settled in
/// its status, or is inconsistent.
pub async fn settle(id: &str) -> Result<(), CommandError> {
    let engine = engine_from_env().await?;
    let id = PurchaseId::normalize(id);
    let outcome = engine.confirm_payment(&id).await?;

    #[allow(clippy::print_stdout)]
    {
        match outcome {
            SettleOutcome::Unchanged => println!("Purchase {id}: nothing to deliver"),
            SettleOutcome::Finalized { delivered } => {
                println!("Purchase {id}: delivered {delivered} unit(s), finalized");
            }
            SettleOutcome::Underdelivered { delivered, missing } => println!(
                "Purchase {id}: delivered {delivered} unit(s), {missing} missing (underdelivered)"
            ),
        }
    }
    Ok(())
}

/// Print purchase IDs containing `fragment`.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn find(fragment: &str) -> Result<(), CommandError> {
    let engine = engine_from_env().await?;
    let ids = engine.find_ids(fragment).await?;

    #[allow(clippy::print_stdout)]
    {
        for id in ids {
            let purchase = engine.purchase_by_id(&id).await?;
            println!(
                "{id}  {:<18} {}  {}",
                purchase.status,
                purchase.create_date,
                purchase.sum()
            );
        }
    }
    Ok(())
}
