//! Periodic maintenance: replenishment sweep, then removal of purchases
//! past their delete date.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::fulfilment::FulfilmentEngine;

/// Spawn a background task that runs [`run_maintenance`] every `interval`.
///
/// The first pass runs immediately.
pub fn spawn_cleanup_task(engine: FulfilmentEngine, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Spawning cleanup task");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_maintenance(&engine).await;
        }
    })
}

/// One maintenance pass. Failures are logged.
///
/// The sweep retries underdelivered purchases whose settlement skipped
/// items another transaction held locked and then rolled back.
pub async fn run_maintenance(engine: &FulfilmentEngine) {
    match engine.fulfil_underdelivered().await {
        Ok(report) if report.attempted > 0 => {
            info!(
                attempted = report.attempted,
                finalized = report.finalized,
                failed = report.failed,
                "Periodic replenishment sweep done"
            );
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Replenishment sweep failed"),
    }
    if let Err(e) = engine.cleanup().await {
        error!(error = %e, "Cleanup sweep failed");
    }
}
