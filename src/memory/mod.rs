//! Memory Module
//!
//! Memory sampling, pressure classification and leak trend detection.

mod leak;
mod pressure;
mod probe;
mod sample;
mod sampler;

pub use leak::{analyze, LeakConfig, LeakReport};
pub use pressure::{PressureLevel, PressureThresholds};
pub use probe::{current_rss_bytes, physical_ram_bytes, MemoryProbe, ProcessMemoryProbe, StaticMemoryProbe};
pub use sample::{MemoryHistory, MemorySample, DEFAULT_HISTORY_CAPACITY};
pub use sampler::{MemorySampler, MemoryStatus, PressureTransition, SampleOutcome};
