//! Adaptive Cache - diagnostics harness
//!
//! Runs the resource cache subsystem with a small HTTP surface for
//! inspecting and driving it.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_cache::api::{create_router, AppState};
use adaptive_cache::Config;

/// Main entry point for the diagnostics harness.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build caches and orchestrator, seeding pages from the durable store
/// 4. Start background sweep, sampling and network tasks
/// 5. Serve the diagnostics router on the configured port
/// 6. On SIGINT/SIGTERM, stop tasks and release every cached handle
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adaptive Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: pages max_entries={} strategy={}, assets max_entries={}, port={}",
        config.page_cache.max_entries,
        config.page_cache.eviction_strategy,
        config.asset_cache.max_entries,
        config.server_port
    );

    let state = AppState::from_config(&config).context("Failed to build cache subsystem")?;
    let seeded = state.pages.seed_from_store().await;
    if seeded > 0 {
        info!("Seeded {} pages from durable store", seeded);
    }

    state.orchestrator.init();

    let orchestrator = state.orchestrator.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Diagnostics listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let report = orchestrator.shutdown().await;
    info!("Shutdown complete; released {}", report.total);
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
