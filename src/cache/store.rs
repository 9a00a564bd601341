//! Page Cache Store Module
//!
//! Synchronous cache engine: fingerprint-keyed pages with pluggable eviction,
//! TTL expiry, byte and entry ceilings, and an optional durable mirror.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::persist::{timestamp_from_ms, DurableStore, PersistedRecord};
use crate::cache::{
    CacheEntry, CacheStats, EvictionStrategy, Fingerprint, PageMetadata, PageQuery, StoredPayload,
};
use crate::config::PageCacheConfig;

/// Outcome of a bulk removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Removed {
    pub entries: usize,
    pub bytes: usize,
}

// == Page Cache ==
/// Page storage with configurable eviction and TTL support.
pub struct PageCache<T> {
    /// Resident pages
    entries: HashMap<Fingerprint, CacheEntry<T>>,
    /// Performance statistics
    stats: CacheStats,
    max_entries: usize,
    max_bytes: usize,
    /// TTL applied to newly stored pages
    entry_ttl: Duration,
    strategy: EvictionStrategy,
    persist_to_store: bool,
    serialize_threshold: usize,
    /// Sum of resident entry sizes
    total_bytes: usize,
    /// Logical clock for recency ordering
    clock: u64,
    store: Option<Arc<dyn DurableStore>>,
}

impl<T> PageCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    // == Constructor ==
    /// Creates an empty cache.
    ///
    /// # Arguments
    /// * `config` - Capacity, TTL, strategy and persistence settings
    pub fn new(config: &PageCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            max_entries: config.max_entries.max(1),
            max_bytes: config.max_bytes,
            entry_ttl: config.entry_ttl,
            strategy: config.eviction_strategy,
            persist_to_store: config.persist_to_store,
            serialize_threshold: config.serialize_threshold_bytes,
            total_bytes: 0,
            clock: 0,
            store: None,
        }
    }

    /// Creates an empty cache mirrored to a durable store.
    pub fn with_store(config: &PageCacheConfig, store: Arc<dyn DurableStore>) -> Self {
        let mut cache = Self::new(config);
        cache.store = Some(store);
        cache
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    // == Get ==
    /// Returns the page for `query`, or `None` on a miss.
    ///
    /// Expired pages are removed and count as misses. Serialized pages are
    /// decoded transparently; a page that fails to decode is dropped and
    /// treated as a miss.
    pub fn get(&mut self, query: &PageQuery) -> Option<T> {
        self.get_by_key(&query.fingerprint())
    }

    pub fn get_by_key(&mut self, key: &Fingerprint) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return self.revive(key),
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            debug!("Page expired on read: {}", key);
            return None;
        }

        let seq = self.tick();
        let decoded = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(seq);
                match &entry.payload {
                    StoredPayload::Live(value) => Ok(value.clone()),
                    StoredPayload::Serialized(raw) => serde_json::from_str::<T>(raw),
                }
            }
            None => return None,
        };

        match decoded {
            Ok(value) => {
                self.stats.record_hit();
                Some(value)
            }
            Err(e) => {
                warn!("Dropping undecodable page {}: {}", key, e);
                self.remove_entry(key);
                self.stats.record_miss();
                None
            }
        }
    }

    /// Serves a miss from the durable mirror when persistence is enabled.
    fn revive(&mut self, key: &Fingerprint) -> Option<T> {
        let record = self.load_record(key);
        let Some(record) = record else {
            self.stats.record_miss();
            return None;
        };

        let value: T = match serde_json::from_value(record.payload.clone()) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding undecodable durable page {}: {}", key, e);
                self.delete_durable(key);
                self.stats.record_miss();
                return None;
            }
        };

        let size = estimate_size(&value);
        if size <= self.max_bytes {
            self.ensure_capacity(size);
            let seq = self.tick();
            let created_at = record.created_at_ms();
            let mut entry = CacheEntry::new(
                key.clone(),
                self.pack(value.clone(), size),
                size,
                record.ttl_ms,
                seq,
                record.metadata,
            );
            entry.created_at = created_at;
            self.insert_entry(entry);
        }

        self.stats.record_revived();
        self.stats.record_hit();
        debug!("Revived page from durable store: {}", key);
        Some(value)
    }

    /// Reads a live record, deleting it from the store if it has expired.
    fn load_record(&self, key: &Fingerprint) -> Option<PersistedRecord> {
        if !self.persist_to_store {
            return None;
        }
        let store = self.store.as_ref()?;

        let raw = match store.get(key.as_str()) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Durable store read failed for {}: {}", key, e);
                return None;
            }
        };

        match PersistedRecord::decode(&raw) {
            Ok(record) if !record.is_expired() => Some(record),
            Ok(_) => {
                debug!("Discarding expired durable page: {}", key);
                self.delete_durable(key);
                None
            }
            Err(e) => {
                warn!("Discarding corrupt durable page {}: {}", key, e);
                self.delete_durable(key);
                None
            }
        }
    }

    // == Put ==
    /// Stores a page, evicting as needed. The last write for a key wins.
    ///
    /// A page larger than the whole byte budget is not cached.
    ///
    /// # Arguments
    /// * `query` - Query the page answers
    /// * `page` - The page payload
    /// * `total_count` - Total matching records, when the source reports it
    pub fn put(&mut self, query: &PageQuery, page: T, total_count: Option<u64>) {
        let key = query.fingerprint();
        let size = estimate_size(&page);

        // Replacing is not an eviction
        if self.entries.contains_key(&key) {
            self.remove_entry(&key);
        }
        // An older durable copy must not outlive this write
        if self.persist_to_store {
            self.delete_durable(&key);
        }

        if size > self.max_bytes {
            warn!(
                "Page {} ({} bytes) exceeds cache budget of {} bytes; not cached",
                key, size, self.max_bytes
            );
            return;
        }

        self.ensure_capacity(size);

        let seq = self.tick();
        let metadata = PageMetadata {
            resource: query.resource.clone(),
            page_number: query.page,
            page_size: query.page_size,
            total_count,
            filter_fingerprint: query.filter_fingerprint(),
        };
        let entry = CacheEntry::new(
            key,
            self.pack(page, size),
            size,
            u64::try_from(self.entry_ttl.as_millis()).unwrap_or(u64::MAX),
            seq,
            metadata,
        );
        self.insert_entry(entry);
    }

    /// Chooses the resident form of a payload by size.
    fn pack(&self, page: T, size: usize) -> StoredPayload<T> {
        if size < self.serialize_threshold {
            return StoredPayload::Live(page);
        }
        match serde_json::to_string(&page) {
            Ok(raw) => StoredPayload::Serialized(raw),
            Err(e) => {
                warn!("Keeping page live, serialization failed: {}", e);
                StoredPayload::Live(page)
            }
        }
    }

    // == Ensure Capacity ==
    /// Evicts until `new_size` more bytes and one more entry fit.
    pub fn ensure_capacity(&mut self, new_size: usize) {
        while !self.entries.is_empty()
            && (self.total_bytes + new_size > self.max_bytes || self.entries.len() >= self.max_entries)
        {
            if !self.evict_one() {
                break;
            }
        }
    }

    /// Evicts the strategy's next victim. Returns false if nothing was evicted.
    fn evict_one(&mut self) -> bool {
        let Some(victim) = self.strategy.select_victim(self.entries.values()) else {
            return false;
        };
        self.evict(&victim).is_some()
    }

    /// Removes an entry as an eviction, mirroring it if it was reused.
    fn evict(&mut self, key: &Fingerprint) -> Option<usize> {
        let entry = self.remove_entry(key)?;
        self.stats.record_eviction();
        debug!(
            "Evicted page {} ({} bytes, {} accesses)",
            key, entry.size_bytes, entry.access_count
        );

        if entry.access_count > 1 {
            self.persist(&entry);
        }
        Some(entry.size_bytes)
    }

    fn persist(&mut self, entry: &CacheEntry<T>) {
        if !self.persist_to_store {
            return;
        }
        let Some(store) = self.store.clone() else {
            return;
        };

        let payload = match &entry.payload {
            StoredPayload::Live(value) => serde_json::to_value(value),
            StoredPayload::Serialized(raw) => serde_json::from_str(raw),
        };
        let record = match payload {
            Ok(payload) => PersistedRecord {
                fingerprint: entry.key.to_string(),
                payload,
                created_at: timestamp_from_ms(entry.created_at),
                ttl_ms: entry.ttl_ms,
                metadata: entry.metadata.clone(),
            },
            Err(e) => {
                warn!("Skipping durable copy of {}: {}", entry.key, e);
                return;
            }
        };

        match record.encode().and_then(|raw| store.put(entry.key.as_str(), raw)) {
            Ok(()) => self.stats.record_persisted(),
            Err(e) => warn!("Durable store write failed for {}: {}", entry.key, e),
        }
    }

    fn delete_durable(&self, key: &Fingerprint) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key.as_str()) {
                warn!("Durable store delete failed for {}: {}", key, e);
            }
        }
    }

    fn insert_entry(&mut self, entry: CacheEntry<T>) {
        self.total_bytes += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);
    }

    fn remove_entry(&mut self, key: &Fingerprint) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    // == Invalidate ==
    /// Removes every page matching `predicate`, including durable copies.
    ///
    /// # Returns
    /// The number of resident pages removed.
    pub fn invalidate<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&Fingerprint, &PageMetadata) -> bool,
    {
        let doomed: Vec<Fingerprint> = self
            .entries
            .values()
            .filter(|entry| predicate(&entry.key, &entry.metadata))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &doomed {
            self.remove_entry(key);
        }

        if let Some(store) = self.store.clone() {
            match store.keys() {
                Ok(keys) => {
                    for raw in keys {
                        let key = Fingerprint::from_raw(raw);
                        let matches = match store.get(key.as_str()) {
                            Ok(Some(raw)) => PersistedRecord::decode(&raw)
                                .map(|record| predicate(&key, &record.metadata))
                                .unwrap_or(true),
                            _ => false,
                        };
                        if matches {
                            self.delete_durable(&key);
                        }
                    }
                }
                Err(e) => warn!("Durable store listing failed: {}", e),
            }
        }

        doomed.len()
    }

    /// Removes every page belonging to one of `resources`.
    pub fn invalidate_resources(&mut self, resources: &[String]) -> usize {
        self.invalidate(|_, meta| resources.iter().any(|r| r == &meta.resource))
    }

    // == Clear ==
    /// Drops every resident page. The durable mirror is left intact.
    pub fn clear(&mut self) -> Removed {
        let removed = Removed {
            entries: self.entries.len(),
            bytes: self.total_bytes,
        };
        self.entries.clear();
        self.total_bytes = 0;
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<Fingerprint> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
            self.stats.record_expiration();
        }

        expired_keys.len()
    }

    // == Trim ==
    /// Evicts the first `ceil(len * fraction)` victims in eviction order.
    pub fn trim(&mut self, fraction: f64) -> Removed {
        let fraction = fraction.clamp(0.0, 1.0);
        let count = (self.entries.len() as f64 * fraction).ceil() as usize;

        let victims = self.strategy.eviction_order(self.entries.values());
        let mut removed = Removed::default();
        for key in victims.into_iter().take(count) {
            if let Some(bytes) = self.evict(&key) {
                removed.entries += 1;
                removed.bytes += bytes;
            }
        }
        removed
    }

    // == Seed ==
    /// Loads unexpired durable records into memory after a cold start.
    ///
    /// Expired or corrupt records are deleted from the store.
    ///
    /// # Returns
    /// The number of pages seeded.
    pub fn seed_from_store(&mut self) -> usize {
        if !self.persist_to_store {
            return 0;
        }
        let Some(store) = self.store.clone() else {
            return 0;
        };
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Durable store listing failed: {}", e);
                return 0;
            }
        };

        let mut records: Vec<PersistedRecord> = Vec::new();
        for raw_key in keys {
            let key = Fingerprint::from_raw(raw_key);
            let raw = match store.get(key.as_str()) {
                Ok(Some(raw)) => raw,
                _ => continue,
            };
            match PersistedRecord::decode(&raw) {
                Ok(record) if !record.is_expired() => records.push(record),
                _ => self.delete_durable(&key),
            }
        }

        // Oldest first so the newest records rank as most recent
        records.sort_by_key(|record| record.created_at);

        let mut seeded = 0;
        for record in records {
            let key = Fingerprint::from_raw(record.fingerprint.clone());
            let value: T = match serde_json::from_value(record.payload.clone()) {
                Ok(value) => value,
                Err(_) => {
                    self.delete_durable(&key);
                    continue;
                }
            };
            let size = estimate_size(&value);
            if size > self.max_bytes || self.entries.contains_key(&key) {
                continue;
            }

            self.ensure_capacity(size);
            let seq = self.tick();
            let created_at = record.created_at_ms();
            let mut entry = CacheEntry::new(
                key,
                self.pack(value, size),
                size,
                record.ttl_ms,
                seq,
                record.metadata,
            );
            entry.created_at = created_at;
            self.insert_entry(entry);
            seeded += 1;
        }

        debug!("Seeded {} pages from durable store", seeded);
        seeded
    }

    // == Accessors ==
    /// Changes the TTL applied to pages stored from now on.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.entry_ttl = ttl;
    }

    pub fn ttl(&self) -> Duration {
        self.entry_ttl
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn contains(&self, query: &PageQuery) -> bool {
        self.entries.contains_key(&query.fingerprint())
    }

    /// Decodes the resident, unexpired page without touching recency or stats.
    pub fn resident(&self, key: &Fingerprint) -> Option<T> {
        let entry = self.entries.get(key).filter(|entry| !entry.is_expired())?;
        match &entry.payload {
            StoredPayload::Live(value) => Some(value.clone()),
            StoredPayload::Serialized(raw) => serde_json::from_str(raw).ok(),
        }
    }

    /// Returns the resident entry without touching it.
    pub fn peek(&self, key: &Fingerprint) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_occupancy(self.entries.len(), self.total_bytes);
        stats
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

/// Best-effort size of a payload: the length of its JSON encoding.
pub fn estimate_size<T: Serialize>(value: &T) -> usize {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .unwrap_or(std::mem::size_of::<T>())
}
