//! Memory Sampling Task
//!
//! Background task that feeds probe readings to the orchestrator, sampling
//! faster while usage is elevated.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::orchestrator::ResourceOrchestrator;

/// Spawns the periodic memory sampler.
///
/// # Arguments
/// * `orchestrator` - Receives each sample
/// * `interval` - Normal sampling period
/// * `fast_interval` - Period while usage is past the elevated threshold
/// * `cancel` - Stops the task
pub fn spawn_sampling_task(
    orchestrator: ResourceOrchestrator,
    interval: Duration,
    fast_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting memory sampling task with interval of {:?} ({:?} when elevated)",
            interval, fast_interval
        );

        loop {
            let elevated = match orchestrator.sample_now().await {
                Some(outcome) => outcome.elevated,
                None => {
                    debug!("Memory probe returned no sample");
                    false
                }
            };
            let next = if elevated { fast_interval } else { interval };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Memory sampling task stopped");
                    break;
                }
                _ = tokio::time::sleep(next) => {}
            }
        }
    })
}
