//! Cache Entry Module
//!
//! Defines a resident page entry with its TTL, access bookkeeping and
//! optionally serialized payload.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::Fingerprint;

// == Page Metadata ==
/// Describes which page of which resource an entry holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub resource: String,
    pub page_number: u32,
    pub page_size: u32,
    pub total_count: Option<u64>,
    pub filter_fingerprint: Option<String>,
}

// == Stored Payload ==
/// Payload held either as a live value or in serialized JSON form.
#[derive(Debug, Clone)]
pub enum StoredPayload<T> {
    Live(T),
    Serialized(String),
}

impl<T> StoredPayload<T> {
    pub fn is_serialized(&self) -> bool {
        matches!(self, StoredPayload::Serialized(_))
    }
}

// == Cache Entry ==
/// A single resident page.
///
/// `created_seq` and `access_seq` come from the owning cache's logical clock
/// and order entries deterministically even when wall-clock timestamps tie.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: Fingerprint,
    pub payload: StoredPayload<T>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last access timestamp (Unix milliseconds), never decreases
    pub last_access_at: u64,
    pub access_count: u64,
    /// Best-effort size estimate
    pub size_bytes: usize,
    /// Lifetime fixed when the entry was stored
    pub ttl_ms: u64,
    pub created_seq: u64,
    pub access_seq: u64,
    pub metadata: PageMetadata,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a freshly stored entry. Storing counts as the first access.
    ///
    /// # Arguments
    /// * `key` - Query fingerprint
    /// * `payload` - Live or serialized page
    /// * `size_bytes` - Estimated size
    /// * `ttl_ms` - Lifetime in milliseconds
    /// * `seq` - Logical clock value at insertion
    /// * `metadata` - Page description
    pub fn new(
        key: Fingerprint,
        payload: StoredPayload<T>,
        size_bytes: usize,
        ttl_ms: u64,
        seq: u64,
        metadata: PageMetadata,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            key,
            payload,
            created_at: now,
            last_access_at: now,
            access_count: 1,
            size_bytes,
            ttl_ms,
            created_seq: seq,
            access_seq: seq,
            metadata,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `created_at + ttl_ms` is reached.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.created_at.saturating_add(self.ttl_ms)
    }

    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.created_at
            .saturating_add(self.ttl_ms)
            .saturating_sub(current_timestamp_ms())
    }

    // == Touch ==
    /// Records an access at logical time `seq`.
    pub fn touch(&mut self, seq: u64) {
        self.last_access_at = self.last_access_at.max(current_timestamp_ms());
        self.access_count += 1;
        self.access_seq = seq;
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
