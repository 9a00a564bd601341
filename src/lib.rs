//! Adaptive Cache - Adaptive resource caching under memory pressure
//!
//! Paged query caching and image asset caching, retuned at runtime by a
//! memory pressure sampler and a network quality observer.

pub mod api;
pub mod assets;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod inflight;
pub mod memory;
pub mod models;
pub mod network;
pub mod orchestrator;
pub mod tasks;

pub use api::AppState;
pub use assets::{BinaryAssetCache, LoadOptions};
pub use cache::{PageQuery, PagedResourceCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use events::{EventBus, ResourceEvent};
pub use orchestrator::ResourceOrchestrator;
pub use tasks::spawn_cleanup_task;
