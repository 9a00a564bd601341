//! Memory Sample Module
//!
//! A single reading of host memory and the bounded history the sampler keeps.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cache::current_timestamp_ms;

/// Default number of samples retained in the history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

// == Memory Sample ==
/// One reading of host memory usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Unix milliseconds
    pub timestamp_ms: u64,
    pub used_bytes: u64,
    pub total_bytes: u64,
    /// Host-imposed ceiling the usage ratio is measured against
    pub limit_bytes: u64,
}

impl MemorySample {
    /// Creates a sample stamped with the current time.
    pub fn now(used_bytes: u64, total_bytes: u64, limit_bytes: u64) -> Self {
        Self::at(current_timestamp_ms(), used_bytes, total_bytes, limit_bytes)
    }

    pub fn at(timestamp_ms: u64, used_bytes: u64, total_bytes: u64, limit_bytes: u64) -> Self {
        Self {
            timestamp_ms,
            used_bytes,
            total_bytes,
            limit_bytes,
        }
    }

    /// Returns `used / limit`, or 0.0 when no limit is known.
    pub fn usage_ratio(&self) -> f64 {
        if self.limit_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.limit_bytes as f64
        }
    }
}

// == Memory History ==
/// Fixed-capacity ring of samples, oldest first.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    samples: VecDeque<MemorySample>,
    capacity: usize,
}

impl MemoryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, dropping the oldest when full.
    pub fn push(&mut self, sample: MemorySample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&MemorySample> {
        self.samples.back()
    }

    /// The most recent `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> Vec<MemorySample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
