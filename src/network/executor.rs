//! Retrying Request Executor
//!
//! Wraps a caller-supplied fetch with network-aware retries and records one
//! metrics entry per logical request.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::network::{
    backoff_delay, sample_jitter, should_retry, FetchError, HttpMethod, NetworkState,
    RequestContext, RetryConfig, RetryTable,
};

/// Default capacity of the request metrics ring.
pub const DEFAULT_METRICS_CAPACITY: usize = 100;

// == Request Metric ==
/// Outcome of one logical request (all of its attempts).
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetric {
    pub url: String,
    pub method: HttpMethod,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub retry_count: u32,
    pub error: Option<String>,
}

/// Aggregates over the metrics currently in the ring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_retries: u64,
    pub average_duration_ms: f64,
}

// == Executor ==
pub struct RetryingRequestExecutor {
    network: watch::Receiver<NetworkState>,
    retry_table: RetryTable,
    metrics: Mutex<VecDeque<RequestMetric>>,
    metrics_capacity: usize,
}

impl RetryingRequestExecutor {
    /// Creates an executor that follows the given network state.
    pub fn new(network: watch::Receiver<NetworkState>, retry_table: RetryTable) -> Self {
        Self::with_metrics_capacity(network, retry_table, DEFAULT_METRICS_CAPACITY)
    }

    pub fn with_metrics_capacity(
        network: watch::Receiver<NetworkState>,
        retry_table: RetryTable,
        metrics_capacity: usize,
    ) -> Self {
        Self {
            network,
            retry_table,
            metrics: Mutex::new(VecDeque::with_capacity(metrics_capacity)),
            metrics_capacity: metrics_capacity.max(1),
        }
    }

    pub fn is_online(&self) -> bool {
        self.network.borrow().online
    }

    /// Retry policy for the current network quality.
    pub fn retry_config(&self) -> RetryConfig {
        self.retry_table.for_quality(self.network.borrow().quality)
    }

    // == Execute ==
    /// Runs `request_fn` until it succeeds or the retry policy gives up.
    ///
    /// Transient failures are retried internally; only the terminal failure is
    /// returned. The online flag is re-read after every failure, so going
    /// offline mid-sequence stops further retries.
    pub async fn execute<T, F, Fut>(&self, ctx: &RequestContext, mut request_fn: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let config = ctx.retry.unwrap_or_else(|| self.retry_config());
        let max_attempts = config.max_attempts.max(1);
        let started = Instant::now();
        let started_at = Utc::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match request_fn().await {
                Ok(value) => {
                    self.record(ctx, started_at, started, true, attempt - 1, None);
                    return Ok(value);
                }
                Err(err) => {
                    if should_retry(err.kind(), attempt, max_attempts, self.is_online()) {
                        let delay = backoff_delay(&config, attempt, sample_jitter(config.jitter_range));
                        debug!(
                            "{} {} failed (attempt {}/{}): {}; retrying in {:?}",
                            ctx.method, ctx.url, attempt, max_attempts, err, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let terminal = if attempt > 1 {
                        FetchError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        }
                    } else {
                        err
                    };

                    warn!("{} {} failed: {}", ctx.method, ctx.url, terminal);
                    self.record(
                        ctx,
                        started_at,
                        started,
                        false,
                        attempt - 1,
                        Some(terminal.to_string()),
                    );
                    return Err(terminal);
                }
            }
        }
    }

    fn record(
        &self,
        ctx: &RequestContext,
        started_at: DateTime<Utc>,
        started: Instant,
        success: bool,
        retry_count: u32,
        error: Option<String>,
    ) {
        let metric = RequestMetric {
            url: ctx.url.clone(),
            method: ctx.method,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            success,
            retry_count,
            error,
        };

        let mut metrics = self.metrics.lock();
        if metrics.len() >= self.metrics_capacity {
            metrics.pop_front();
        }
        metrics.push_back(metric);
    }

    // == Metrics ==
    /// Recorded metrics, oldest first.
    pub fn recent_metrics(&self) -> Vec<RequestMetric> {
        self.metrics.lock().iter().cloned().collect()
    }

    pub fn summary(&self) -> RequestSummary {
        let metrics = self.metrics.lock();
        if metrics.is_empty() {
            return RequestSummary::default();
        }

        let succeeded = metrics.iter().filter(|m| m.success).count();
        let total_duration: u64 = metrics.iter().map(|m| m.duration_ms).sum();

        RequestSummary {
            total: metrics.len(),
            succeeded,
            failed: metrics.len() - succeeded,
            total_retries: metrics.iter().map(|m| m.retry_count as u64).sum(),
            average_duration_ms: total_duration as f64 / metrics.len() as f64,
        }
    }
}
