//! Network Polling Task
//!
//! Background task that polls a connectivity probe and hands readings to the
//! orchestrator. The observer filters out readings that do not change the
//! quality tier.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::network::ConnectivityProbe;
use crate::orchestrator::ResourceOrchestrator;

pub fn spawn_network_task(
    orchestrator: ResourceOrchestrator,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting network polling task with interval of {:?}", interval);

        loop {
            if let Some(signal) = probe.probe() {
                orchestrator.observe_network(&signal).await;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Network polling task stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    })
}
