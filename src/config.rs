//! Configuration Module
//!
//! Loads subsystem configuration from environment variables. Every value is
//! optional and falls back to a default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::EvictionStrategy;
use crate::memory::{LeakConfig, PressureThresholds, DEFAULT_HISTORY_CAPACITY};
use crate::network::RetryTable;

// == Page Cache ==
/// Page cache capacity, lifetime and persistence settings.
#[derive(Debug, Clone)]
pub struct PageCacheConfig {
    /// Maximum number of resident pages
    pub max_entries: usize,
    /// Maximum estimated bytes across resident pages
    pub max_bytes: usize,
    /// Staleness window applied to newly stored pages
    pub entry_ttl: Duration,
    pub eviction_strategy: EvictionStrategy,
    /// Mirror evicted-but-reused pages to the durable store
    pub persist_to_store: bool,
    /// Directory for the file-backed durable store
    pub store_dir: Option<PathBuf>,
    /// Pages at least this large are held in serialized form
    pub serialize_threshold_bytes: usize,
    /// Background expiry sweep period
    pub sweep_interval: Duration,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_bytes: 10 * 1024 * 1024,
            entry_ttl: Duration::from_secs(5 * 60),
            eviction_strategy: EvictionStrategy::Lru,
            persist_to_store: false,
            store_dir: None,
            serialize_threshold_bytes: 64 * 1024,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

// == Asset Cache ==
#[derive(Debug, Clone)]
pub struct AssetCacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
    /// Assets at or below this size skip transcoding unless overridden
    pub small_asset_bytes: usize,
    /// Quality used when a load does not ask for one
    pub default_quality: u8,
    pub max_concurrent_preloads: usize,
}

impl Default for AssetCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 200,
            max_bytes: 50 * 1024 * 1024,
            small_asset_bytes: 50 * 1024,
            default_quality: 80,
            max_concurrent_preloads: 4,
        }
    }
}

// == Sampler ==
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Sampling period under normal conditions
    pub interval: Duration,
    /// Sampling period once usage passes the elevated threshold
    pub fast_interval: Duration,
    pub history_capacity: usize,
    pub thresholds: PressureThresholds,
    pub leak: LeakConfig,
    /// Ceiling for the usage ratio; total RAM when unset
    pub limit_bytes: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            fast_interval: Duration::from_secs(5),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            thresholds: PressureThresholds::default(),
            leak: LeakConfig::default(),
            limit_bytes: None,
        }
    }
}

// == Orchestrator ==
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Share of each cache removed by a conservative cleanup
    pub conservative_fraction: f64,
    /// Resources whose pages are invalidated on return to foreground
    pub critical_resources: Vec<String>,
    /// Connectivity probe period
    pub network_poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            conservative_fraction: 0.25,
            critical_resources: Vec::new(),
            network_poll_interval: Duration::from_secs(10),
        }
    }
}

// == Config ==
/// Complete subsystem configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub page_cache: PageCacheConfig,
    pub asset_cache: AssetCacheConfig,
    pub sampler: SamplerConfig,
    pub retry: RetryTable,
    pub orchestrator: OrchestratorConfig,
    /// Diagnostics HTTP port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_cache: PageCacheConfig::default(),
            asset_cache: AssetCacheConfig::default(),
            sampler: SamplerConfig::default(),
            retry: RetryTable::default(),
            orchestrator: OrchestratorConfig::default(),
            server_port: 3000,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Page cache entry ceiling (default: 100)
    /// - `CACHE_MAX_BYTES` - Page cache byte ceiling (default: 10 MiB)
    /// - `CACHE_ENTRY_TTL_MS` - Page staleness window (default: 300000)
    /// - `CACHE_EVICTION_STRATEGY` - `LRU`, `FIFO` or `LFU` (default: LRU)
    /// - `CACHE_PERSIST` - Mirror evicted pages to disk (default: false)
    /// - `CACHE_STORE_DIR` - Durable store directory (default: unset)
    /// - `ASSET_MAX_ENTRIES` - Asset cache entry ceiling (default: 200)
    /// - `ASSET_MAX_BYTES` - Asset cache byte ceiling (default: 50 MiB)
    /// - `PRESSURE_THRESHOLDS` - Four ascending percents (default: 60,75,85,95)
    /// - `SAMPLE_INTERVAL_MS` - Memory sampling period (default: 30000)
    /// - `MEMORY_LIMIT_BYTES` - Usage ceiling (default: total RAM)
    /// - `CRITICAL_RESOURCES` - Comma-separated resource names (default: none)
    /// - `DIAGNOSTICS_PORT` - HTTP port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let thresholds = match env::var("PRESSURE_THRESHOLDS") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("Ignoring PRESSURE_THRESHOLDS: {}", e);
                defaults.sampler.thresholds
            }),
            Err(_) => defaults.sampler.thresholds,
        };

        let page_cache = PageCacheConfig {
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.page_cache.max_entries),
            max_bytes: env_or("CACHE_MAX_BYTES", defaults.page_cache.max_bytes),
            entry_ttl: env::var("CACHE_ENTRY_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_cache.entry_ttl),
            eviction_strategy: env_or("CACHE_EVICTION_STRATEGY", defaults.page_cache.eviction_strategy),
            persist_to_store: env_or("CACHE_PERSIST", defaults.page_cache.persist_to_store),
            store_dir: env::var("CACHE_STORE_DIR").ok().map(PathBuf::from),
            ..defaults.page_cache
        };

        let asset_cache = AssetCacheConfig {
            max_entries: env_or("ASSET_MAX_ENTRIES", defaults.asset_cache.max_entries),
            max_bytes: env_or("ASSET_MAX_BYTES", defaults.asset_cache.max_bytes),
            ..defaults.asset_cache
        };

        let sampler = SamplerConfig {
            interval: env::var("SAMPLE_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sampler.interval),
            thresholds,
            limit_bytes: env::var("MEMORY_LIMIT_BYTES").ok().and_then(|v| v.parse().ok()),
            ..defaults.sampler
        };

        let orchestrator = OrchestratorConfig {
            critical_resources: env::var("CRITICAL_RESOURCES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            ..defaults.orchestrator
        };

        Self {
            page_cache,
            asset_cache,
            sampler,
            retry: defaults.retry,
            orchestrator,
            server_port: env_or("DIAGNOSTICS_PORT", defaults.server_port),
        }
    }
}

/// Reads and parses an environment variable, falling back to `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
