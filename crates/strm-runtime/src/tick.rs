use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::StreamService;

/// Run `sync_all` every `interval` until the service shuts down.
///
/// The first tick fires one interval after spawn; startup has already run
/// the initial pass. Failures are recorded in the service's health and
/// retried on the next tick.
pub fn spawn_reconcile_loop(service: Arc<StreamService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if service.is_shut_down() {
                info!("reconcile loop stopped: service shut down");
                break;
            }
            if let Ok(report) = service.sync_all().await {
                debug!(ledger_seq = report.ledger_seq, quiet = report.is_quiet(), "reconcile tick");
            }
        }
    })
}
