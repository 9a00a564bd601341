//! API Routes
//!
//! Configures the Axum router with all diagnostics endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cleanup_handler, health_handler, lifecycle_handler, memory_handler, network_handler,
    network_signal_handler, requests_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /stats` - Page cache, asset cache and handle statistics
/// - `GET /memory` - Latest sample, pressure level and leak report
/// - `GET /network` - Network state and strategy
/// - `POST /network` - Push a connectivity signal
/// - `GET /requests` - Recent request metrics
/// - `POST /cleanup` - Run a conservative or emergency cleanup
/// - `POST /lifecycle` - Report a foreground/background transition
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/memory", get(memory_handler))
        .route("/network", get(network_handler).post(network_signal_handler))
        .route("/requests", get(requests_handler))
        .route("/cleanup", post(cleanup_handler))
        .route("/lifecycle", post(lifecycle_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::memory::StaticMemoryProbe;
    use crate::network::{AssetSource, FetchError, FetchedAsset};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    struct NoSource;

    impl AssetSource for NoSource {
        fn fetch(&self, _url: &str) -> BoxFuture<'_, Result<FetchedAsset, FetchError>> {
            Box::pin(async { Err(FetchError::Offline) })
        }
    }

    fn create_test_app() -> Router {
        let state = AppState::new(
            &Config::default(),
            Arc::new(NoSource),
            Arc::new(StaticMemoryProbe::new(100, 1000, 1000)),
            None,
        );
        create_router(state)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_memory_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/memory").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cleanup_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cleanup")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"mode":"conservative"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/get/key").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
