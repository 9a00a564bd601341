//! Network Module
//!
//! Connection quality classification, the per-quality caching strategy, and
//! the retrying request executor.

mod executor;
mod fetch;
mod observer;
mod quality;
mod retry;

pub use executor::{RequestMetric, RequestSummary, RetryingRequestExecutor, DEFAULT_METRICS_CAPACITY};
pub use fetch::{
    AssetSource, ErrorKind, FetchError, FetchedAsset, HttpFetcher, HttpMethod, RequestContext,
};
pub use observer::{ConnectivityProbe, NetworkChange, NetworkQualityObserver};
pub use quality::{classify, EffectiveType, NetworkQuality, NetworkSignal, NetworkState, NetworkStrategy};
pub use retry::{backoff_delay, sample_jitter, should_retry, RetryConfig, RetryTable};
