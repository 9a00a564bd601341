//! Managed Cache Seam
//!
//! The object-safe interface the orchestrator drives caches through, and the
//! reports cleanups produce.

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::memory::PressureLevel;
use crate::network::NetworkStrategy;

// == Trim Result ==
/// What one removal pass freed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimResult {
    pub entries_removed: usize,
    pub bytes_freed: usize,
}

impl TrimResult {
    pub fn new(entries_removed: usize, bytes_freed: usize) -> Self {
        Self {
            entries_removed,
            bytes_freed,
        }
    }
}

impl fmt::Display for TrimResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {:.1} KB",
            self.entries_removed,
            self.bytes_freed as f64 / 1024.0
        )
    }
}

// == Cache Snapshot ==
/// Uniform view of a cache's occupancy and counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheSnapshot {
    pub name: String,
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

// == Managed Cache ==
/// A cache the orchestrator can trim, clear, sweep and retune.
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &str;

    /// Evicts roughly `fraction` of entries, least valuable first.
    fn trim(&self, fraction: f64) -> BoxFuture<'_, TrimResult>;

    /// Removes everything, releasing any host resources held.
    fn clear_all(&self) -> BoxFuture<'_, TrimResult>;

    /// Drops expired entries. Returns how many were removed.
    fn sweep_expired(&self) -> BoxFuture<'_, usize>;

    /// Invalidates entries belonging to the named resources.
    fn invalidate_resources<'a>(&'a self, resources: &'a [String]) -> BoxFuture<'a, usize>;

    /// Retunes lifetimes and preloading for a new network tier.
    fn apply_strategy(&self, strategy: NetworkStrategy) -> BoxFuture<'_, ()>;

    fn snapshot(&self) -> BoxFuture<'_, CacheSnapshot>;
}

// == Cleanup ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Trim a share of every cache
    Conservative,
    /// Clear every cache and release application state
    Emergency,
}

/// Why a cleanup ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "level", rename_all = "lowercase")]
pub enum CleanupReason {
    Pressure(PressureLevel),
    Background,
    Manual,
    Shutdown,
}

/// Summary of one cleanup across all registered caches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub mode: CleanupMode,
    pub reason: CleanupReason,
    pub caches: Vec<(String, TrimResult)>,
    pub total: TrimResult,
    /// Application state releasers invoked
    pub states_released: usize,
    /// Whether a garbage-collection hint was issued
    pub gc_hinted: bool,
}

impl CleanupReport {
    pub fn new(mode: CleanupMode, reason: CleanupReason) -> Self {
        Self {
            mode,
            reason,
            caches: Vec::new(),
            total: TrimResult::default(),
            states_released: 0,
            gc_hinted: false,
        }
    }

    pub fn add(&mut self, name: &str, result: TrimResult) {
        self.total.entries_removed += result.entries_removed;
        self.total.bytes_freed += result.bytes_freed;
        self.caches.push((name.to_string(), result));
    }
}
