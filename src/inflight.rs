//! In-Flight Fetch Registry
//!
//! De-duplicates concurrent fetches by key. The first caller starts the fetch
//! in its own task; later callers for the same key await the same shared
//! result. Dropping a waiter never cancels the fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::network::FetchError;

/// Shared handle to a pending fetch result.
pub type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

// == In-Flight Registry ==
pub struct InFlight<V> {
    pending: Arc<Mutex<HashMap<String, SharedFetch<V>>>>,
}

impl<V> Clone for InFlight<V> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
        }
    }
}

impl<V> Default for InFlight<V> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<V> InFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the fetch pending under `key`, or spawns `fetch` if none is.
    ///
    /// # Returns
    /// The shared result and whether this call started the fetch.
    pub fn join_or_start<F>(&self, key: &str, fetch: F) -> (SharedFetch<V>, bool)
    where
        F: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(key) {
            return (existing.clone(), false);
        }

        // The task deregisters itself; it blocks on the lock until the
        // insert below is done.
        let registry = self.pending.clone();
        let owned_key = key.to_string();
        let handle = tokio::spawn(async move {
            let result = fetch.await;
            registry.lock().remove(&owned_key);
            result
        });

        let shared = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(FetchError::Cancelled),
                Err(e) => Err(FetchError::Invalid(format!("Fetch task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), shared.clone());
        (shared, true)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn slow_fetch(calls: Arc<AtomicU32>, value: u32) -> impl Future<Output = Result<u32, FetchError>> {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let inflight: InFlight<u32> = InFlight::new();
        let calls = Arc::new(AtomicU32::new(0));

        let (a, started_a) = inflight.join_or_start("k", slow_fetch(calls.clone(), 1));
        let (b, started_b) = inflight.join_or_start("k", slow_fetch(calls.clone(), 2));

        assert!(started_a);
        assert!(!started_b);

        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.unwrap(), 1);
        assert_eq!(rb.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_removed_after_completion() {
        let inflight: InFlight<u32> = InFlight::new();
        let calls = Arc::new(AtomicU32::new(0));

        let (fut, _) = inflight.join_or_start("k", slow_fetch(calls.clone(), 1));
        assert!(inflight.is_pending("k"));
        fut.await.unwrap();

        // Deregistration happens inside the task, right before it resolves
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(inflight.is_empty());

        let (_, started) = inflight.join_or_start("k", slow_fetch(calls, 2));
        assert!(started);
    }

    #[tokio::test]
    async fn test_abandoned_fetch_still_completes() {
        let inflight: InFlight<u32> = InFlight::new();
        let done = Arc::new(AtomicU32::new(0));
        let done_flag = done.clone();

        let (fut, _) = inflight.join_or_start("k", async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            done_flag.store(1, Ordering::SeqCst);
            Ok(7)
        });
        drop(fut);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_shared() {
        let inflight: InFlight<u32> = InFlight::new();

        let (a, _) = inflight.join_or_start("k", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(FetchError::http(500))
        });
        let (b, _) = inflight.join_or_start("k", async { Ok(1) });

        assert_eq!(a.await.unwrap_err(), FetchError::http(500));
        assert_eq!(b.await.unwrap_err(), FetchError::http(500));
    }
}
