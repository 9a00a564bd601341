//! Response DTOs for the diagnostics API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::assets::{AssetCacheStats, RegistryStats};
use crate::cache::CacheStats;
use crate::network::{NetworkState, NetworkStrategy, RequestMetric, RequestSummary};
use crate::orchestrator::{CacheSnapshot, CleanupReport, LifecycleOutcome, Visibility};

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub pages: CacheStats,
    pub page_hit_rate: f64,
    pub assets: AssetCacheStats,
    pub asset_hit_rate: f64,
    /// Live host handles
    pub handles: RegistryStats,
    /// Uniform view of every registered cache
    pub caches: Vec<CacheSnapshot>,
}

impl StatsResponse {
    pub fn new(
        pages: CacheStats,
        assets: AssetCacheStats,
        handles: RegistryStats,
        caches: Vec<CacheSnapshot>,
    ) -> Self {
        Self {
            page_hit_rate: pages.hit_rate(),
            asset_hit_rate: assets.hit_rate(),
            pages,
            assets,
            handles,
            caches,
        }
    }
}

/// Response body for GET /network and POST /network
#[derive(Debug, Clone, Serialize)]
pub struct NetworkResponse {
    pub state: NetworkState,
    pub strategy: NetworkStrategy,
    /// Whether the submitted signal changed the quality tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

/// Response body for GET /requests
#[derive(Debug, Clone, Serialize)]
pub struct RequestsResponse {
    pub summary: RequestSummary,
    pub recent: Vec<RequestMetric>,
}

/// Response body for POST /cleanup
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub report: CleanupReport,
}

impl CleanupResponse {
    pub fn new(report: CleanupReport) -> Self {
        Self {
            message: format!("Cleanup removed {}", report.total),
            report,
        }
    }
}

/// Response body for POST /lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleResponse {
    pub visibility: Visibility,
    pub outcome: LifecycleOutcome,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Current memory pressure level
    pub pressure: String,
    /// Whether background tasks are running
    pub running: bool,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(pressure: impl Into<String>, running: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            pressure: pressure.into(),
            running,
        }
    }
}
