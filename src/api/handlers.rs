//! API Handlers
//!
//! HTTP request handlers for each diagnostics endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::Value;
use tracing::info;

use crate::assets::{BinaryAssetCache, BlobRegistry};
use crate::cache::{DurableStore, FileDurableStore, PagedResourceCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::memory::{MemoryProbe, MemoryStatus, ProcessMemoryProbe};
use crate::models::{
    CleanupRequest, CleanupResponse, HealthResponse, LifecycleRequest, LifecycleResponse, NetworkResponse,
    NetworkSignalRequest, RequestsResponse, StatsResponse,
};
use crate::network::{
    AssetSource, EffectiveType, HttpFetcher, NetworkQualityObserver, NetworkSignal, RetryingRequestExecutor,
};
use crate::orchestrator::{CleanupReason, ResourceOrchestrator};

/// Application state shared across all handlers.
///
/// Holds the orchestrator and the two caches it manages.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ResourceOrchestrator,
    /// Page cache; payloads are opaque JSON
    pub pages: PagedResourceCache<Value>,
    pub assets: BinaryAssetCache,
    pub handles: Arc<BlobRegistry>,
}

impl AppState {
    /// Wires the subsystem from parts.
    ///
    /// Leaf components first: observer, executor, caches, then the
    /// orchestrator that registers both caches.
    pub fn new(
        config: &Config,
        source: Arc<dyn AssetSource>,
        probe: Arc<dyn MemoryProbe>,
        durable: Option<Arc<dyn DurableStore>>,
    ) -> Self {
        let observer = Arc::new(NetworkQualityObserver::new(&NetworkSignal::online(
            EffectiveType::Unknown,
        )));
        let executor = Arc::new(RetryingRequestExecutor::new(
            observer.subscribe(),
            config.retry.clone(),
        ));
        let handles = Arc::new(BlobRegistry::new());

        let pages = match durable {
            Some(store) => PagedResourceCache::with_durable_store("pages", &config.page_cache, store),
            None => PagedResourceCache::new("pages", &config.page_cache),
        }
        .with_executor(executor.clone());

        let assets = BinaryAssetCache::with_executor(
            "assets",
            &config.asset_cache,
            source,
            handles.clone(),
            executor.clone(),
        );

        let orchestrator = ResourceOrchestrator::new(config, observer, executor, probe);
        orchestrator.register_cache(Arc::new(pages.clone()));
        orchestrator.register_cache(Arc::new(assets.clone()));

        Self {
            orchestrator,
            pages,
            assets,
            handles,
        }
    }

    /// Creates the production wiring: reqwest fetcher, `/proc` memory probe,
    /// and a file store when persistence is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn AssetSource> = Arc::new(HttpFetcher::new()?);
        let probe: Arc<dyn MemoryProbe> = Arc::new(ProcessMemoryProbe::new(config.sampler.limit_bytes));

        let page_cache = &config.page_cache;
        let durable: Option<Arc<dyn DurableStore>> = match (&page_cache.store_dir, page_cache.persist_to_store) {
            (Some(dir), true) => {
                info!("Durable page store at {}", dir.display());
                Some(Arc::new(FileDurableStore::open(dir.clone())?))
            }
            _ => None,
        };

        Ok(Self::new(config, source, probe, durable))
    }
}

/// Handler for GET /stats
///
/// Returns page cache, asset cache and handle statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let status = state.orchestrator.status().await;

    Json(StatsResponse::new(
        state.pages.stats().await,
        state.assets.stats().await,
        state.handles.stats(),
        status.caches,
    ))
}

/// Handler for GET /memory
///
/// Returns the latest sample, pressure level and leak report.
pub async fn memory_handler(State(state): State<AppState>) -> Json<MemoryStatus> {
    Json(state.orchestrator.memory_status())
}

/// Handler for GET /network
pub async fn network_handler(State(state): State<AppState>) -> Json<NetworkResponse> {
    let observer = state.orchestrator.observer();
    Json(NetworkResponse {
        state: observer.current(),
        strategy: observer.strategy(),
        changed: None,
    })
}

/// Handler for POST /network
///
/// Pushes a connectivity reading, as a host without a probe would.
pub async fn network_signal_handler(
    State(state): State<AppState>,
    Json(req): Json<NetworkSignalRequest>,
) -> Result<Json<NetworkResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let change = state.orchestrator.observe_network(&req.into_signal()).await;
    let observer = state.orchestrator.observer();

    Ok(Json(NetworkResponse {
        state: observer.current(),
        strategy: observer.strategy(),
        changed: Some(change.is_some()),
    }))
}

/// Handler for GET /requests
///
/// Returns recent request metrics from the executor's ring.
pub async fn requests_handler(State(state): State<AppState>) -> Json<RequestsResponse> {
    let executor = state.orchestrator.executor();
    Json(RequestsResponse {
        summary: executor.summary(),
        recent: executor.recent_metrics(),
    })
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(
    State(state): State<AppState>,
    Json(req): Json<CleanupRequest>,
) -> Json<CleanupResponse> {
    let report = state.orchestrator.cleanup(req.mode, CleanupReason::Manual).await;
    Json(CleanupResponse::new(report))
}

/// Handler for POST /lifecycle
///
/// Reports a host visibility transition.
pub async fn lifecycle_handler(
    State(state): State<AppState>,
    Json(req): Json<LifecycleRequest>,
) -> Json<LifecycleResponse> {
    let outcome = state.orchestrator.on_visibility_change(req.visibility).await;
    Json(LifecycleResponse {
        visibility: req.visibility,
        outcome,
    })
}

/// Handler for GET /health
///
/// Returns health status of the subsystem.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.orchestrator.pressure_level().as_str(),
        state.orchestrator.is_running(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryDurableStore, PageQuery};
    use crate::memory::{PressureLevel, StaticMemoryProbe};
    use crate::network::{FetchError, FetchedAsset};
    use crate::orchestrator::{CleanupMode, LifecycleOutcome, Visibility};
    use futures::future::BoxFuture;
    use serde_json::json;

    struct NoSource;

    impl AssetSource for NoSource {
        fn fetch(&self, _url: &str) -> BoxFuture<'_, std::result::Result<FetchedAsset, FetchError>> {
            Box::pin(async { Err(FetchError::Offline) })
        }
    }

    fn test_state() -> AppState {
        AppState::new(
            &Config::default(),
            Arc::new(NoSource),
            Arc::new(StaticMemoryProbe::new(100, 1000, 1000)),
            Some(Arc::new(MemoryDurableStore::new())),
        )
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();
        state
            .pages
            .put(&PageQuery::new("invoices", 1, 10), json!([1, 2]), Some(2))
            .await;

        let response = stats_handler(State(state)).await;
        assert_eq!(response.pages.total_entries, 1);
        assert_eq!(response.assets.total_entries, 0);
        assert_eq!(response.caches.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_handler() {
        let state = test_state();
        for page in 0..4 {
            state
                .pages
                .put(&PageQuery::new("invoices", page, 10), json!([page]), None)
                .await;
        }

        let response = cleanup_handler(
            State(state.clone()),
            Json(CleanupRequest {
                mode: CleanupMode::Emergency,
            }),
        )
        .await;

        assert_eq!(response.report.total.entries_removed, 4);
        assert!(state.pages.is_empty().await);
    }

    #[tokio::test]
    async fn test_lifecycle_handler() {
        let state = test_state();
        let response = lifecycle_handler(
            State(state),
            Json(LifecycleRequest {
                visibility: Visibility::Background,
            }),
        )
        .await;

        assert!(matches!(response.outcome, LifecycleOutcome::Cleaned { .. }));
    }

    #[tokio::test]
    async fn test_network_signal_handler_rejects_invalid() {
        let state = test_state();
        let req: NetworkSignalRequest =
            serde_json::from_value(json!({"online": true, "downlink_mbps": -3.0})).unwrap();

        let result = network_signal_handler(State(state), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(test_state())).await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.pressure, PressureLevel::Low.as_str());
        assert!(!response.running);
    }
}
