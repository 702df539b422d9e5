//! Periodic persistence scheduler.

use progression_common::ProgressionManager;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info, warn};

/// Spawn a task that calls `save_all` every `period` until `shutdown`
/// flips to true or its sender is dropped.
pub fn spawn_autosave(
    manager: Arc<ProgressionManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Autosave every {}s", period.as_secs_f64());
        // First tick after one full period; startup state was just loaded
        let mut interval = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let worker = Arc::clone(&manager);
                    match tokio::task::spawn_blocking(move || worker.save_all()).await {
                        Ok(Ok(count)) => debug!("Autosaved {} sessions", count),
                        Ok(Err(e)) => warn!("Autosave failed: {}", e),
                        Err(e) => warn!("Autosave task panicked: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Autosave stopping");
                        break;
                    }
                }
            }
        }
    })
}
