//! Paged Resource Cache
//!
//! Shared async front of [`PageCache`]: fetch-on-miss through the retrying
//! executor with in-flight de-duplication, plus the orchestrator seam.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheStats, DurableStore, Fingerprint, PageCache, PageMetadata, PageQuery};
use crate::config::PageCacheConfig;
use crate::inflight::InFlight;
use crate::network::{FetchError, NetworkStrategy, RequestContext, RetryingRequestExecutor};
use crate::orchestrator::{CacheSnapshot, ManagedCache, TrimResult};

/// A fetched page and the total record count the source reported.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
    pub data: T,
    pub total_count: Option<u64>,
}

// == Paged Resource Cache ==
pub struct PagedResourceCache<T> {
    name: String,
    store: Arc<RwLock<PageCache<T>>>,
    inflight: InFlight<T>,
    executor: Option<Arc<RetryingRequestExecutor>>,
}

impl<T> Clone for PagedResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: self.store.clone(),
            inflight: self.inflight.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<T> PagedResourceCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, config: &PageCacheConfig) -> Self {
        Self::from_store(name, PageCache::new(config))
    }

    /// Creates a cache mirrored to `durable`.
    pub fn with_durable_store(
        name: impl Into<String>,
        config: &PageCacheConfig,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        Self::from_store(name, PageCache::with_store(config, durable))
    }

    fn from_store(name: impl Into<String>, store: PageCache<T>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(RwLock::new(store)),
            inflight: InFlight::new(),
            executor: None,
        }
    }

    /// Routes misses fetched by [`get_or_fetch`](Self::get_or_fetch) through `executor`.
    pub fn with_executor(mut self, executor: Arc<RetryingRequestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Shared handle to the underlying store.
    pub fn shared(&self) -> Arc<RwLock<PageCache<T>>> {
        self.store.clone()
    }

    // == Reads and Writes ==
    pub async fn get(&self, query: &PageQuery) -> Option<T> {
        self.store.write().await.get(query)
    }

    pub async fn put(&self, query: &PageQuery, page: T, total_count: Option<u64>) {
        self.store.write().await.put(query, page, total_count);
    }

    // == Get Or Fetch ==
    /// Returns the cached page, fetching and storing it on a miss.
    ///
    /// Concurrent callers for the same fingerprint share one fetch. The fetch
    /// runs in its own task, so a caller that stops waiting does not cancel
    /// it and the page still lands in the cache.
    ///
    /// # Arguments
    /// * `query` - Page to read
    /// * `ctx` - URL, method and optional retry override, for the executor
    /// * `fetch` - One attempt at loading the page
    pub async fn get_or_fetch<F, Fut>(
        &self,
        query: &PageQuery,
        ctx: RequestContext,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<FetchedPage<T>, FetchError>> + Send + 'static,
    {
        if let Some(page) = self.get(query).await {
            return Ok(page);
        }

        let key = query.fingerprint();
        let store = self.store.clone();
        let executor = self.executor.clone();
        let owned_query = query.clone();
        let owned_key = key.clone();

        let (pending, started) = self.inflight.join_or_start(key.as_str(), async move {
            // A fetch that finished after our miss check may already have stored it
            if let Some(page) = store.read().await.resident(&owned_key) {
                return Ok(page);
            }

            let mut fetch = fetch;
            let fetched = match executor {
                Some(executor) => executor.execute(&ctx, fetch).await?,
                None => fetch().await?,
            };
            store
                .write()
                .await
                .put(&owned_query, fetched.data.clone(), fetched.total_count);
            Ok(fetched.data)
        });

        if !started {
            debug!("Joining in-flight fetch for {}", key);
        }
        pending.await
    }

    // == Maintenance ==
    /// Removes pages matching `predicate`, durable copies included.
    pub async fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Fingerprint, &PageMetadata) -> bool,
    {
        self.store.write().await.invalidate(predicate)
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.store.write().await.cleanup_expired()
    }

    pub async fn set_ttl(&self, ttl: Duration) {
        self.store.write().await.set_ttl(ttl);
    }

    pub async fn ttl(&self) -> Duration {
        self.store.read().await.ttl()
    }

    /// Cold-start seed from the durable mirror.
    pub async fn seed_from_store(&self) -> usize {
        self.store.write().await.seed_from_store()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

// == Managed Cache ==
impl<T> ManagedCache for PagedResourceCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn trim(&self, fraction: f64) -> BoxFuture<'_, TrimResult> {
        Box::pin(async move {
            let removed = self.store.write().await.trim(fraction);
            TrimResult::new(removed.entries, removed.bytes)
        })
    }

    fn clear_all(&self) -> BoxFuture<'_, TrimResult> {
        Box::pin(async move {
            let removed = self.store.write().await.clear();
            TrimResult::new(removed.entries, removed.bytes)
        })
    }

    fn sweep_expired(&self) -> BoxFuture<'_, usize> {
        Box::pin(self.cleanup_expired())
    }

    fn invalidate_resources<'a>(&'a self, resources: &'a [String]) -> BoxFuture<'a, usize> {
        Box::pin(async move { self.store.write().await.invalidate_resources(resources) })
    }

    fn apply_strategy(&self, strategy: NetworkStrategy) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            debug!("{}: page TTL now {:?}", self.name, strategy.cache_ttl);
            self.set_ttl(strategy.cache_ttl).await;
        })
    }

    fn snapshot(&self) -> BoxFuture<'_, CacheSnapshot> {
        Box::pin(async move {
            let store = self.store.read().await;
            let stats = store.stats();
            CacheSnapshot {
                name: self.name.clone(),
                entries: stats.total_entries,
                bytes: stats.total_bytes,
                max_entries: store.max_entries(),
                max_bytes: store.max_bytes(),
                hits: stats.hits,
                misses: stats.misses,
                evictions: stats.evictions,
                hit_rate: stats.hit_rate(),
            }
        })
    }
}
