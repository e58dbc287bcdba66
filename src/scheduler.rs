use crate::sync::{SyncEngine, SyncStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Runs the sync engine once immediately and then every `period`. Ticks that
/// fall behind are dropped rather than replayed.
pub fn spawn_sync_schedule(engine: Arc<SyncEngine>, period: Duration) -> JoinHandle<()> {
    info!("Scheduling sync every {}s", period.as_secs());
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            run_and_log(&engine).await;
        }
    })
}

/// One triggered run. Failures are logged and left for the next tick.
async fn run_and_log(engine: &SyncEngine) {
    match engine.run_sync().await {
        Ok(report) if report.status == SyncStatus::Skipped => {
            info!("Sync trigger skipped, a run is already in progress");
        }
        Ok(report) => {
            if let Some(message) = report.shortfall() {
                warn!("Sync run stopped early: {}", message);
            }
        }
        Err(e) => error!("Sync run failed: {}", e),
    }
}
