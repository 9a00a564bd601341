//! Host Resource Handles
//!
//! Opaque blob handles owned by the host. `ObjectHandle` releases its handle
//! exactly once: when dropped, or earlier through [`ObjectHandle::release`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

// == Handle Id ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:adaptive-cache/{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Unknown handle: {0}")]
    UnknownHandle(HandleId),

    #[error("Handle already released: {0}")]
    AlreadyReleased(HandleId),

    #[error("Host refused: {0}")]
    Refused(String),
}

// == Handle Host ==
/// Whatever owns the blobs behind handles: an object-URL table, a GPU
/// texture pool, a file cache.
pub trait HandleHost: Send + Sync {
    fn create(&self, blob: &[u8], mime: &str) -> Result<HandleId, HostError>;

    fn release(&self, id: HandleId) -> Result<(), HostError>;
}

// == Object Handle ==
/// Owned reference to one host handle.
///
/// Not `Clone`: ownership is the release-exactly-once guarantee.
pub struct ObjectHandle {
    id: HandleId,
    host: Arc<dyn HandleHost>,
    released: bool,
}

impl ObjectHandle {
    /// Registers `blob` with `host` and takes ownership of the handle.
    pub fn create(host: Arc<dyn HandleHost>, blob: &[u8], mime: &str) -> Result<Self, HostError> {
        let id = host.create(blob, mime)?;
        Ok(Self {
            id,
            host,
            released: false,
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// URI the host resolves this handle under.
    pub fn uri(&self) -> String {
        self.id.to_string()
    }

    /// Releases now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Release failures must never block eviction
        match self.host.release(self.id) {
            Ok(()) => debug!("Released {}", self.id),
            Err(e) => warn!("Failed to release {}: {}", self.id, e),
        }
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

// == Blob Registry ==
/// Counters for an in-process [`BlobRegistry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub created: u64,
    pub released: u64,
    pub double_releases: u64,
    pub live: usize,
    pub live_bytes: usize,
}

/// In-process [`HandleHost`] that keeps blob sizes and counts every create
/// and release, so leaks and double releases are observable.
#[derive(Default)]
pub struct BlobRegistry {
    live: Mutex<HashMap<HandleId, usize>>,
    next_id: AtomicU64,
    created: AtomicU64,
    released: AtomicU64,
    double_releases: AtomicU64,
    refuse_releases: AtomicBool,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following release fail, for exercising the failure path.
    pub fn set_refuse_releases(&self, refuse: bool) {
        self.refuse_releases.store(refuse, Ordering::SeqCst);
    }

    pub fn is_live(&self, id: HandleId) -> bool {
        self.live.lock().contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    pub fn stats(&self) -> RegistryStats {
        let live = self.live.lock();
        RegistryStats {
            created: self.created.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            double_releases: self.double_releases.load(Ordering::SeqCst),
            live: live.len(),
            live_bytes: live.values().sum(),
        }
    }
}

impl HandleHost for BlobRegistry {
    fn create(&self, blob: &[u8], _mime: &str) -> Result<HandleId, HostError> {
        let id = HandleId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.live.lock().insert(id, blob.len());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn release(&self, id: HandleId) -> Result<(), HostError> {
        if self.refuse_releases.load(Ordering::SeqCst) {
            return Err(HostError::Refused("releases disabled".to_string()));
        }

        if self.live.lock().remove(&id).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        self.double_releases.fetch_add(1, Ordering::SeqCst);
        if id.get() <= self.next_id.load(Ordering::SeqCst) {
            Err(HostError::AlreadyReleased(id))
        } else {
            Err(HostError::UnknownHandle(id))
        }
    }
}
