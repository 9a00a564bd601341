//! Background Tasks Module
//!
//! Periodic work spawned by the orchestrator. Every task stops when its
//! cancellation token fires.
//!
//! # Tasks
//! - TTL Cleanup: Sweeps expired entries from a managed cache
//! - Memory Sampling: Feeds probe readings to the pressure state machine
//! - Network Polling: Feeds connectivity readings to the quality observer

mod cleanup;
mod network;
mod sampling;

pub use cleanup::spawn_cleanup_task;
pub use network::spawn_network_task;
pub use sampling::spawn_sampling_task;
