//! Binary Asset Cache
//!
//! Image cache with a fetch-then-transcode pipeline, in-flight
//! de-duplication and priority-aware eviction. Every entry owns an
//! [`ObjectHandle`]; eviction, trimming and clearing release it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::assets::transcode::{needs_transcode, sniff, transcode_blocking, TranscodePlan};
use crate::assets::{AssetPriority, AssetRef, HandleHost, ImageCacheEntry, LoadOptions, ObjectHandle};
use crate::cache::current_timestamp_ms;
use crate::config::AssetCacheConfig;
use crate::inflight::InFlight;
use crate::network::{AssetSource, FetchError, NetworkStrategy, RequestContext, RetryingRequestExecutor};
use crate::orchestrator::{CacheSnapshot, ManagedCache, TrimResult};

const OCTET_STREAM: &str = "application/octet-stream";

// == Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Fetches that completed, cached or not
    pub loads: u64,
    pub transcoded: u64,
    /// Assets stored as fetched after a failed transcode
    pub transcode_failures: u64,
    /// Assets returned without caching because they exceed the byte budget
    pub uncached: u64,
    pub total_entries: usize,
    pub total_bytes: usize,
}

impl AssetCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Asset Store ==
/// Synchronous core. Removal methods hand entries back so their handles can
/// be released once the lock is gone.
struct AssetStore {
    entries: HashMap<String, ImageCacheEntry>,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
    seq: u64,
    stats: AssetCacheStats,
}

impl AssetStore {
    fn new(config: &AssetCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            total_bytes: 0,
            max_entries: config.max_entries.max(1),
            max_bytes: config.max_bytes,
            seq: 0,
            stats: AssetCacheStats::default(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Hit path. A higher requested priority sticks to the entry.
    fn get(&mut self, key: &str, priority: AssetPriority) -> Option<AssetRef> {
        let seq = self.tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(seq);
                entry.priority = entry.priority.max(priority);
                self.stats.hits += 1;
                Some(entry.to_ref())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Raises a resident entry to at least `priority`, without counting a hit.
    fn raise_priority(&mut self, key: &str, priority: AssetPriority) -> Option<AssetPriority> {
        let entry = self.entries.get_mut(key)?;
        entry.priority = entry.priority.max(priority);
        Some(entry.priority)
    }

    /// Inserts `entry`, returning whatever it displaced.
    fn insert(&mut self, mut entry: ImageCacheEntry) -> Vec<ImageCacheEntry> {
        let mut displaced = Vec::new();
        if let Some(old) = self.remove(&entry.key) {
            displaced.push(old);
        }

        displaced.extend(self.ensure_capacity(entry.size_bytes));

        entry.access_seq = self.tick();
        self.total_bytes += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);
        displaced
    }

    /// Evicts until `new_size` more bytes and one more entry fit.
    fn ensure_capacity(&mut self, new_size: usize) -> Vec<ImageCacheEntry> {
        let mut evicted = Vec::new();
        while !self.entries.is_empty()
            && (self.total_bytes + new_size > self.max_bytes || self.entries.len() >= self.max_entries)
        {
            let Some(victim) = self.next_victim() else {
                break;
            };
            if let Some(entry) = self.remove(&victim) {
                debug!("Evicted asset {} ({:?}, {} bytes)", entry.url, entry.priority, entry.size_bytes);
                self.stats.evictions += 1;
                evicted.push(entry);
            }
        }
        evicted
    }

    fn next_victim(&self) -> Option<String> {
        self.entries
            .values()
            .min_by_key(|entry| entry.rank())
            .map(|entry| entry.key.clone())
    }

    fn remove(&mut self, key: &str) -> Option<ImageCacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Evicts the lowest-ranked `ceil(len * fraction)` entries.
    fn trim(&mut self, fraction: f64) -> Vec<ImageCacheEntry> {
        let fraction = fraction.clamp(0.0, 1.0);
        let count = (self.entries.len() as f64 * fraction).ceil() as usize;

        let mut ranked: Vec<(u8, u64, String)> = self
            .entries
            .values()
            .map(|entry| {
                let (priority, seq) = entry.rank();
                (priority, seq, entry.key.clone())
            })
            .collect();
        ranked.sort();

        let mut removed = Vec::with_capacity(count);
        for (_, _, key) in ranked.into_iter().take(count) {
            if let Some(entry) = self.remove(&key) {
                self.stats.evictions += 1;
                removed.push(entry);
            }
        }
        removed
    }

    fn drain(&mut self) -> Vec<ImageCacheEntry> {
        self.total_bytes = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    fn stats(&self) -> AssetCacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.total_bytes = self.total_bytes;
        stats
    }
}

/// Releases each entry's handle and reports what was freed.
fn release_all(entries: Vec<ImageCacheEntry>) -> TrimResult {
    let mut result = TrimResult::default();
    for entry in entries {
        result.entries_removed += 1;
        result.bytes_freed += entry.size_bytes;
        entry.release();
    }
    result
}

// == Binary Asset Cache ==
struct Inner {
    name: String,
    store: RwLock<AssetStore>,
    inflight: InFlight<AssetRef>,
    source: Arc<dyn AssetSource>,
    host: Arc<dyn HandleHost>,
    executor: Option<Arc<RetryingRequestExecutor>>,
    small_asset_bytes: usize,
    default_quality: AtomicU8,
    preload_enabled: AtomicBool,
    max_concurrent_preloads: AtomicUsize,
}

/// Shared image cache. Clones refer to the same entries.
#[derive(Clone)]
pub struct BinaryAssetCache {
    inner: Arc<Inner>,
}

impl BinaryAssetCache {
    /// Creates a cache that fetches through `source` and registers blobs with `host`.
    pub fn new(
        name: impl Into<String>,
        config: &AssetCacheConfig,
        source: Arc<dyn AssetSource>,
        host: Arc<dyn HandleHost>,
    ) -> Self {
        Self::build(name.into(), config, source, host, None)
    }

    /// Like [`new`](Self::new), with fetches routed through `executor`.
    pub fn with_executor(
        name: impl Into<String>,
        config: &AssetCacheConfig,
        source: Arc<dyn AssetSource>,
        host: Arc<dyn HandleHost>,
        executor: Arc<RetryingRequestExecutor>,
    ) -> Self {
        Self::build(name.into(), config, source, host, Some(executor))
    }

    fn build(
        name: String,
        config: &AssetCacheConfig,
        source: Arc<dyn AssetSource>,
        host: Arc<dyn HandleHost>,
        executor: Option<Arc<RetryingRequestExecutor>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                store: RwLock::new(AssetStore::new(config)),
                inflight: InFlight::new(),
                source,
                host,
                executor,
                small_asset_bytes: config.small_asset_bytes,
                default_quality: AtomicU8::new(config.default_quality.clamp(1, 100)),
                preload_enabled: AtomicBool::new(true),
                max_concurrent_preloads: AtomicUsize::new(config.max_concurrent_preloads.max(1)),
            }),
        }
    }

    // == Load ==
    /// Returns the asset for `url`, fetching and transcoding it on a miss.
    ///
    /// Concurrent loads of the same url and transform share one fetch.
    /// Only the fetch's terminal failure is returned; transcode problems
    /// fall back to the bytes as fetched.
    ///
    /// # Arguments
    /// * `url` - Asset location
    /// * `options` - Priority and transform
    pub async fn load(&self, url: &str, options: &LoadOptions) -> Result<AssetRef, FetchError> {
        let key = options.fingerprint(url);
        if let Some(found) = self.inner.store.write().await.get(&key, options.priority) {
            return Ok(found);
        }

        let inner = self.inner.clone();
        let owned_url = url.to_string();
        let owned_options = options.clone();
        let owned_key = key.clone();
        let (pending, started) = self.inner.inflight.join_or_start(&key, async move {
            fetch_and_store(inner, owned_key, owned_url, owned_options).await
        });

        if !started {
            debug!("Joining in-flight load for {}", url);
        }
        let mut asset = pending.await?;

        // The shared load stored the starter's priority; a joiner may need more
        if let Some(priority) = self.inner.store.write().await.raise_priority(&key, options.priority) {
            asset.priority = priority;
        }
        Ok(asset)
    }

    // == Visibility ==
    /// Promotes cached low-priority variants of `url` to medium.
    ///
    /// # Returns
    /// How many entries were promoted.
    pub async fn mark_visible(&self, url: &str) -> usize {
        let mut store = self.inner.store.write().await;
        let mut promoted = 0;
        for entry in store.entries.values_mut() {
            if entry.url == url && entry.priority == AssetPriority::Low {
                entry.priority = AssetPriority::Medium;
                promoted += 1;
            }
        }
        promoted
    }

    // == Preload ==
    /// Loads `urls` in the background of the caller, at most
    /// `max_concurrent_preloads` at a time.
    ///
    /// Does nothing while the network strategy disables preloading.
    ///
    /// # Returns
    /// How many urls loaded successfully.
    pub async fn preload(&self, urls: Vec<String>, options: LoadOptions) -> usize {
        if !self.preload_enabled() {
            debug!("Preload of {} assets skipped; disabled by network strategy", urls.len());
            return 0;
        }

        let limit = self.inner.max_concurrent_preloads.load(Ordering::Relaxed).max(1);
        let total = urls.len();
        let loaded = stream::iter(urls)
            .map(|url| {
                let cache = self.clone();
                let options = options.clone();
                async move { cache.load(&url, &options).await }
            })
            .buffer_unordered(limit)
            .filter(|result| futures::future::ready(result.is_ok()))
            .count()
            .await;

        debug!("Preloaded {}/{} assets", loaded, total);
        loaded
    }

    // == Maintenance ==
    /// Evicts a share of entries, lowest priority and least recent first.
    pub async fn trim_fraction(&self, fraction: f64) -> TrimResult {
        let removed = self.inner.store.write().await.trim(fraction);
        release_all(removed)
    }

    /// Removes every entry, releasing all handles.
    pub async fn clear(&self) -> TrimResult {
        let drained = self.inner.store.write().await.drain();
        let result = release_all(drained);
        if result.entries_removed > 0 {
            info!("{}: cleared {}", self.inner.name, result);
        }
        result
    }

    pub async fn contains(&self, url: &str, options: &LoadOptions) -> bool {
        self.inner
            .store
            .read()
            .await
            .entries
            .contains_key(&options.fingerprint(url))
    }

    /// Current priority of the cached variant, if any.
    pub async fn priority_of(&self, url: &str, options: &LoadOptions) -> Option<AssetPriority> {
        self.inner
            .store
            .read()
            .await
            .entries
            .get(&options.fingerprint(url))
            .map(|entry| entry.priority)
    }

    pub async fn stats(&self) -> AssetCacheStats {
        self.inner.store.read().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.inner.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.store.read().await.entries.is_empty()
    }

    pub fn default_quality(&self) -> u8 {
        self.inner.default_quality.load(Ordering::Relaxed)
    }

    pub fn preload_enabled(&self) -> bool {
        self.inner.preload_enabled.load(Ordering::Relaxed)
    }
}

// == Fetch Pipeline ==
/// One fetch: network, optional transcode, then store.
async fn fetch_and_store(
    inner: Arc<Inner>,
    key: String,
    url: String,
    options: LoadOptions,
) -> Result<AssetRef, FetchError> {
    // A load that finished after the caller's miss check may already have stored it
    if let Some(entry) = inner.store.read().await.entries.get(&key) {
        return Ok(entry.to_ref());
    }

    let source = inner.source.clone();
    let fetched = match &inner.executor {
        Some(executor) => {
            executor
                .execute(&RequestContext::get(url.clone()), || source.fetch(&url))
                .await?
        }
        None => source.fetch(&url).await?,
    };

    let fetched_size = fetched.bytes.len();
    let mut asset = AssetRef {
        url: url.clone(),
        handle_uri: None,
        inline: None,
        mime: fetched.content_type.clone().unwrap_or_else(|| OCTET_STREAM.to_string()),
        format: None,
        dimensions: None,
        size_bytes: fetched_size,
        priority: options.priority,
        transcoded: false,
    };
    let mut transcode_failed = false;

    let bytes = if needs_transcode(fetched_size, &options, inner.small_asset_bytes) {
        let plan = TranscodePlan::from_options(&options, inner.default_quality.load(Ordering::Relaxed));
        match transcode_blocking(fetched.bytes.clone(), plan).await {
            // Keep the original when an unrequested re-encode does not shrink it
            Ok(out) if options.has_override() || out.bytes.len() < fetched_size => {
                asset.mime = out.format.mime().to_string();
                asset.format = Some(out.format);
                asset.dimensions = Some(out.dimensions);
                asset.transcoded = true;
                out.bytes
            }
            Ok(_) => fetched.bytes,
            Err(e) => {
                warn!("Storing {} untransformed: {}", url, e);
                transcode_failed = true;
                fetched.bytes
            }
        }
    } else {
        fetched.bytes
    };

    if !asset.transcoded {
        if let Some((format, dimensions)) = sniff(&bytes) {
            asset.format = Some(format);
            asset.dimensions = Some(dimensions);
            if asset.mime == OCTET_STREAM {
                asset.mime = format.mime().to_string();
            }
        }
    }
    asset.size_bytes = bytes.len();

    let max_bytes = inner.store.read().await.max_bytes;
    {
        let mut store = inner.store.write().await;
        store.stats.loads += 1;
        if asset.transcoded {
            store.stats.transcoded += 1;
        }
        if transcode_failed {
            store.stats.transcode_failures += 1;
        }
    }

    if asset.size_bytes > max_bytes {
        warn!(
            "Asset {} ({} bytes) exceeds cache budget of {} bytes; not cached",
            url, asset.size_bytes, max_bytes
        );
        inner.store.write().await.stats.uncached += 1;
        asset.inline = Some(bytes.into());
        return Ok(asset);
    }

    let handle = match ObjectHandle::create(inner.host.clone(), &bytes, &asset.mime) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Host rejected handle for {}; returning uncached: {}", url, e);
            inner.store.write().await.stats.uncached += 1;
            asset.inline = Some(bytes.into());
            return Ok(asset);
        }
    };
    asset.handle_uri = Some(handle.uri());

    let now = current_timestamp_ms();
    let entry = ImageCacheEntry {
        key,
        url,
        handle,
        mime: asset.mime.clone(),
        format: asset.format,
        dimensions: asset.dimensions,
        size_bytes: asset.size_bytes,
        priority: asset.priority,
        transcoded: asset.transcoded,
        created_at: now,
        last_access_at: now,
        access_count: 1,
        access_seq: 0,
    };

    let displaced = inner.store.write().await.insert(entry);
    release_all(displaced);
    Ok(asset)
}

// == Managed Cache ==
impl ManagedCache for BinaryAssetCache {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn trim(&self, fraction: f64) -> BoxFuture<'_, TrimResult> {
        Box::pin(self.trim_fraction(fraction))
    }

    fn clear_all(&self) -> BoxFuture<'_, TrimResult> {
        Box::pin(self.clear())
    }

    // Assets carry no TTL
    fn sweep_expired(&self) -> BoxFuture<'_, usize> {
        Box::pin(async { 0 })
    }

    fn invalidate_resources<'a>(&'a self, _resources: &'a [String]) -> BoxFuture<'a, usize> {
        Box::pin(async { 0 })
    }

    fn apply_strategy(&self, strategy: NetworkStrategy) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.inner
                .default_quality
                .store(strategy.compression_quality.clamp(1, 100), Ordering::Relaxed);
            self.inner
                .preload_enabled
                .store(strategy.preload_enabled, Ordering::Relaxed);
            self.inner
                .max_concurrent_preloads
                .store(strategy.max_concurrent_preloads.max(1), Ordering::Relaxed);
            debug!(
                "{}: quality {}, preload {}",
                self.inner.name, strategy.compression_quality, strategy.preload_enabled
            );
        })
    }

    fn snapshot(&self) -> BoxFuture<'_, CacheSnapshot> {
        Box::pin(async move {
            let store = self.inner.store.read().await;
            let stats = store.stats();
            CacheSnapshot {
                name: self.inner.name.clone(),
                entries: stats.total_entries,
                bytes: stats.total_bytes,
                max_entries: store.max_entries,
                max_bytes: store.max_bytes,
                hits: stats.hits,
                misses: stats.misses,
                evictions: stats.evictions,
                hit_rate: stats.hit_rate(),
            }
        })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetFormat, BlobRegistry};
    use crate::network::{FetchedAsset, NetworkQuality};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Serves fixed bytes per url and counts fetches.
    struct FakeSource {
        body: Vec<u8>,
        calls: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl FakeSource {
        fn new(body: Vec<u8>) -> Self {
            Self {
                body,
                calls: AtomicU32::new(0),
                delay: Duration::from_millis(20),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AssetSource for FakeSource {
        fn fetch(&self, _url: &str) -> BoxFuture<'_, Result<FetchedAsset, FetchError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                if self.fail {
                    return Err(FetchError::http(404));
                }
                Ok(FetchedAsset {
                    bytes: self.body.clone(),
                    content_type: None,
                })
            })
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn config(max_entries: usize, max_bytes: usize) -> AssetCacheConfig {
        AssetCacheConfig {
            max_entries,
            max_bytes,
            small_asset_bytes: 1024 * 1024,
            ..AssetCacheConfig::default()
        }
    }

    fn setup(config: &AssetCacheConfig, source: FakeSource) -> (BinaryAssetCache, Arc<FakeSource>, Arc<BlobRegistry>) {
        let source = Arc::new(source);
        let host = Arc::new(BlobRegistry::new());
        let cache = BinaryAssetCache::new("assets", config, source.clone(), host.clone());
        (cache, source, host)
    }

    fn low() -> LoadOptions {
        LoadOptions::default().with_priority(AssetPriority::Low)
    }

    fn high() -> LoadOptions {
        LoadOptions::default().with_priority(AssetPriority::High)
    }

    #[tokio::test]
    async fn test_load_caches_and_hits() {
        let (cache, source, host) = setup(&config(10, 1 << 20), FakeSource::new(png(8, 8)));

        let first = cache.load("/a.png", &LoadOptions::default()).await.unwrap();
        let second = cache.load("/a.png", &LoadOptions::default()).await.unwrap();

        assert!(first.is_cached());
        assert_eq!(first.handle_uri, second.handle_uri);
        assert_eq!(first.format, Some(AssetFormat::Png));
        assert_eq!(source.calls(), 1);
        assert_eq!(host.stats().live, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loads, 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let (cache, source, host) = setup(&config(10, 1 << 20), FakeSource::new(png(8, 8)));
        let options = LoadOptions::default();

        let (a, b) = tokio::join!(cache.load("/a.png", &options), cache.load("/a.png", &options));

        assert_eq!(a.unwrap().handle_uri, b.unwrap().handle_uri);
        assert_eq!(source.calls(), 1);
        assert_eq!(host.stats().created, 1);
    }

    #[tokio::test]
    async fn test_joined_load_raises_priority() {
        let (cache, source, _) = setup(&config(10, 1 << 20), FakeSource::new(png(8, 8)));

        let (low_ctx, high_ctx) = (low(), high());
        let (a, b) = tokio::join!(cache.load("/a.png", &low_ctx), cache.load("/a.png", &high_ctx));

        assert_eq!(a.unwrap().handle_uri, b.as_ref().unwrap().handle_uri);
        assert_eq!(b.unwrap().priority, AssetPriority::High);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.priority_of("/a.png", &low()).await, Some(AssetPriority::High));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_stored_asset_is_not_fetched_again() {
        let (cache, source, host) = setup(&config(10, 1 << 20), FakeSource::new(png(8, 8)));
        let options = LoadOptions::default();
        let first = cache.load("/a.png", &options).await.unwrap();

        // As if this load had missed just before the first one stored
        let second = fetch_and_store(
            cache.inner.clone(),
            options.fingerprint("/a.png"),
            "/a.png".to_string(),
            options.clone(),
        )
        .await
        .unwrap();

        assert_eq!(first.handle_uri, second.handle_uri);
        assert_eq!(source.calls(), 1);
        assert_eq!(host.stats().created, 1);
    }

    #[tokio::test]
    async fn test_low_priority_evicted_before_recency() {
        let (cache, _, host) = setup(&config(2, 1 << 20), FakeSource::new(png(4, 4)));

        cache.load("/low.png", &low()).await.unwrap();
        cache.load("/high.png", &high()).await.unwrap();
        // Touch low so it is the most recent
        cache.load("/low.png", &low()).await.unwrap();
        cache.load("/new.png", &high()).await.unwrap();

        assert!(!cache.contains("/low.png", &low()).await);
        assert!(cache.contains("/high.png", &high()).await);
        assert!(cache.contains("/new.png", &high()).await);

        let stats = host.stats();
        assert_eq!(stats.released, 1);
        assert_eq!(stats.live, 2);
    }

    #[tokio::test]
    async fn test_equal_priority_falls_back_to_recency() {
        let (cache, _, _) = setup(&config(2, 1 << 20), FakeSource::new(png(4, 4)));
        let options = LoadOptions::default();

        cache.load("/a.png", &options).await.unwrap();
        cache.load("/b.png", &options).await.unwrap();
        cache.load("/a.png", &options).await.unwrap();
        cache.load("/c.png", &options).await.unwrap();

        assert!(cache.contains("/a.png", &options).await);
        assert!(!cache.contains("/b.png", &options).await);
    }

    #[tokio::test]
    async fn test_clear_releases_every_handle_once() {
        let (cache, _, host) = setup(&config(3, 1 << 20), FakeSource::new(png(4, 4)));
        for i in 0..5 {
            cache.load(&format!("/{}.png", i), &LoadOptions::default()).await.unwrap();
        }

        let cleared = cache.clear().await;
        assert_eq!(cleared.entries_removed, 3);

        let stats = host.stats();
        assert_eq!(stats.created, 5);
        assert_eq!(stats.released, 5);
        assert_eq!(stats.double_releases, 0);
        assert_eq!(stats.live, 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_oversize_asset_returned_uncached() {
        let body = png(32, 32);
        let (cache, _, host) = setup(&config(10, 16), FakeSource::new(body));

        let asset = cache.load("/big.png", &LoadOptions::default()).await.unwrap();

        assert!(!asset.is_cached());
        assert!(asset.inline.is_some());
        assert_eq!(host.stats().created, 0);
        assert_eq!(cache.stats().await.uncached, 1);
    }

    #[tokio::test]
    async fn test_override_transcodes_small_asset() {
        let (cache, _, _) = setup(&config(10, 1 << 20), FakeSource::new(png(64, 32)));
        let options = LoadOptions::default().with_max_size(16, 16);

        let asset = cache.load("/a.png", &options).await.unwrap();

        assert!(asset.transcoded);
        assert_eq!(asset.format, Some(AssetFormat::Jpeg));
        assert_eq!(asset.dimensions.map(|d| (d.width, d.height)), Some((16, 8)));
        assert_eq!(asset.mime, "image/jpeg");
    }

    #[tokio::test]
    async fn test_undecodable_asset_stored_as_fetched() {
        let (cache, _, _) = setup(&config(10, 1 << 20), FakeSource::new(b"opaque bytes".to_vec()));
        let options = LoadOptions::default().with_quality(50);

        let asset = cache.load("/blob", &options).await.unwrap();

        assert!(asset.is_cached());
        assert!(!asset.transcoded);
        assert_eq!(asset.mime, OCTET_STREAM);
        assert_eq!(cache.stats().await.transcode_failures, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces() {
        let (cache, _, host) = setup(&config(10, 1 << 20), FakeSource::failing());

        let result = cache.load("/missing.png", &LoadOptions::default()).await;

        assert_eq!(result.unwrap_err(), FetchError::http(404));
        assert!(cache.is_empty().await);
        assert_eq!(host.stats().created, 0);
    }

    #[tokio::test]
    async fn test_mark_visible_promotes_low() {
        let (cache, _, _) = setup(&config(10, 1 << 20), FakeSource::new(png(4, 4)));
        cache.load("/a.png", &low()).await.unwrap();

        assert_eq!(cache.mark_visible("/a.png").await, 1);
        assert_eq!(cache.priority_of("/a.png", &low()).await, Some(AssetPriority::Medium));
        // Already medium, nothing more to do
        assert_eq!(cache.mark_visible("/a.png").await, 0);
        assert_eq!(cache.mark_visible("/gone.png").await, 0);
    }

    #[tokio::test]
    async fn test_preload_respects_strategy() {
        let (cache, source, _) = setup(&config(10, 1 << 20), FakeSource::new(png(4, 4)));
        let urls: Vec<String> = (0..6).map(|i| format!("/{}.png", i)).collect();

        cache
            .apply_strategy(NetworkStrategy::for_quality(NetworkQuality::Poor))
            .await;
        assert!(!cache.preload_enabled());
        assert_eq!(cache.preload(urls.clone(), low()).await, 0);
        assert_eq!(source.calls(), 0);

        cache
            .apply_strategy(NetworkStrategy::for_quality(NetworkQuality::Excellent))
            .await;
        assert_eq!(cache.preload(urls, low()).await, 6);
        assert_eq!(cache.len().await, 6);
    }

    #[tokio::test]
    async fn test_trim_prefers_low_priority() {
        let (cache, _, host) = setup(&config(10, 1 << 20), FakeSource::new(png(4, 4)));
        cache.load("/h1.png", &high()).await.unwrap();
        cache.load("/l1.png", &low()).await.unwrap();
        cache.load("/h2.png", &high()).await.unwrap();
        cache.load("/l2.png", &low()).await.unwrap();

        let result = cache.trim(0.5).await;

        assert_eq!(result.entries_removed, 2);
        assert!(!cache.contains("/l1.png", &low()).await);
        assert!(!cache.contains("/l2.png", &low()).await);
        assert_eq!(host.stats().released, 2);
    }

    #[tokio::test]
    async fn test_apply_strategy_sets_quality() {
        let (cache, _, _) = setup(&config(10, 1 << 20), FakeSource::new(png(4, 4)));
        cache
            .apply_strategy(NetworkStrategy::for_quality(NetworkQuality::Poor))
            .await;
        assert_eq!(
            cache.default_quality(),
            NetworkStrategy::for_quality(NetworkQuality::Poor).compression_quality
        );
    }
}
