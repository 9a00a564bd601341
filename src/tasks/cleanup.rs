//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::orchestrator::ManagedCache;

/// Spawns a background task that periodically sweeps expired entries from
/// `cache`.
///
/// The task sleeps for `interval` between sweeps and exits as soon as
/// `cancel` fires.
///
/// # Arguments
/// * `cache` - Cache to sweep
/// * `interval` - Time between sweeps
/// * `cancel` - Stops the task
///
/// # Returns
/// A JoinHandle for the spawned task.
pub fn spawn_cleanup_task(
    cache: Arc<dyn ManagedCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task for {} with interval of {:?}",
            cache.name(),
            interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("TTL cleanup task for {} stopped", cache.name());
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let removed = cache.sweep_expired().await;

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
