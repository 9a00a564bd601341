//! Eviction Policy Module
//!
//! Selects which resident page to evict under the configured strategy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, Fingerprint};
use crate::error::CacheError;

// == Eviction Strategy ==
/// Runtime-selectable eviction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionStrategy {
    /// Oldest last access first
    #[default]
    Lru,
    /// Oldest insertion first
    Fifo,
    /// Fewest accesses first, ties broken by oldest last access
    Lfu,
}

impl EvictionStrategy {
    /// Sort key of an entry; the smallest key is evicted first.
    pub fn rank<T>(&self, entry: &CacheEntry<T>) -> (u64, u64) {
        match self {
            EvictionStrategy::Lru => (entry.access_seq, 0),
            EvictionStrategy::Fifo => (entry.created_seq, 0),
            EvictionStrategy::Lfu => (entry.access_count, entry.access_seq),
        }
    }

    // == Select Victim ==
    /// Returns the key of the entry to evict next, or `None` if empty.
    pub fn select_victim<'a, T, I>(&self, entries: I) -> Option<Fingerprint>
    where
        T: 'a,
        I: IntoIterator<Item = &'a CacheEntry<T>>,
    {
        entries
            .into_iter()
            .min_by_key(|entry| self.rank(entry))
            .map(|entry| entry.key.clone())
    }

    /// All keys in eviction order, first victim first.
    pub fn eviction_order<'a, T, I>(&self, entries: I) -> Vec<Fingerprint>
    where
        T: 'a,
        I: IntoIterator<Item = &'a CacheEntry<T>>,
    {
        let mut ranked: Vec<((u64, u64), &Fingerprint)> = entries
            .into_iter()
            .map(|entry| (self.rank(entry), &entry.key))
            .collect();
        ranked.sort();
        ranked.into_iter().map(|(_, key)| key.clone()).collect()
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionStrategy::Lru => "LRU",
            EvictionStrategy::Fifo => "FIFO",
            EvictionStrategy::Lfu => "LFU",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LRU" => Ok(EvictionStrategy::Lru),
            "FIFO" => Ok(EvictionStrategy::Fifo),
            "LFU" => Ok(EvictionStrategy::Lfu),
            other => Err(CacheError::InvalidConfig(format!(
                "Unknown eviction strategy: {}",
                other
            ))),
        }
    }
}
