//! Cache Module
//!
//! Paged resource caching with pluggable eviction, TTL expiry, and an
//! optional durable mirror.

mod entry;
mod fingerprint;
mod paged;
mod persist;
mod policy;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, PageMetadata, StoredPayload};
pub use fingerprint::{Fingerprint, PageQuery, SortOrder};
pub use paged::{FetchedPage, PagedResourceCache};
pub use persist::{
    timestamp_from_ms, DurableStore, FileDurableStore, MemoryDurableStore, PersistedRecord, StoreError,
};
pub use policy::EvictionStrategy;
pub use stats::CacheStats;
pub use store::{estimate_size, PageCache, Removed};
