//! Memory Probes
//!
//! Sources of memory samples polled by the sampling task.

use std::fs;

use parking_lot::Mutex;

use crate::memory::MemorySample;

/// Source of memory readings.
pub trait MemoryProbe: Send + Sync {
    /// Takes one reading. `None` when the host exposes no figures.
    fn sample(&self) -> Option<MemorySample>;
}

// == Process Probe ==
/// Reads resident set size and total RAM from procfs.
///
/// Without a configured limit, total RAM serves as the ceiling.
#[derive(Debug, Clone, Default)]
pub struct ProcessMemoryProbe {
    limit_bytes: Option<u64>,
}

impl ProcessMemoryProbe {
    pub fn new(limit_bytes: Option<u64>) -> Self {
        Self { limit_bytes }
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let used = current_rss_bytes()?;
        let total = physical_ram_bytes().unwrap_or(0);
        let limit = self.limit_bytes.unwrap_or(total);
        Some(MemorySample::now(used, total, limit))
    }
}

/// Resident set size of this process.
pub fn current_rss_bytes() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    kib_field(&status, "VmRSS:")
}

/// Physical memory installed on the host.
pub fn physical_ram_bytes() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    kib_field(&meminfo, "MemTotal:")
}

/// Parses a `Name:   1234 kB` line into bytes.
fn kib_field(text: &str, name: &str) -> Option<u64> {
    let line = text.lines().find(|line| line.starts_with(name))?;
    let kib: u64 = line[name.len()..].split_whitespace().next()?.parse().ok()?;
    Some(kib.saturating_mul(1024))
}

// == Static Probe ==
/// Probe returning whatever usage was last set. Used by hosts that push
/// their own figures and by tests.
#[derive(Debug)]
pub struct StaticMemoryProbe {
    current: Mutex<(u64, u64, u64)>,
}

impl StaticMemoryProbe {
    pub fn new(used_bytes: u64, total_bytes: u64, limit_bytes: u64) -> Self {
        Self {
            current: Mutex::new((used_bytes, total_bytes, limit_bytes)),
        }
    }

    pub fn set_used(&self, used_bytes: u64) {
        self.current.lock().0 = used_bytes;
    }
}

impl MemoryProbe for StaticMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let (used, total, limit) = *self.current.lock();
        Some(MemorySample::now(used, total, limit))
    }
}
