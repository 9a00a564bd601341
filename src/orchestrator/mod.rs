//! Resource Orchestrator
//!
//! Reactive coordinator over the registered caches. Pressure transitions
//! from the memory sampler, host visibility changes and network tier changes
//! all arrive here and become trims, clears, invalidations or retuning.
//!
//! The orchestrator is an explicitly constructed context object with an
//! `init`/`shutdown` pair; clones share state.

mod managed;

pub use managed::{CacheSnapshot, CleanupMode, CleanupReason, CleanupReport, ManagedCache, TrimResult};

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, OrchestratorConfig, SamplerConfig};
use crate::events::{EventBus, ResourceEvent};
use crate::memory::{MemoryProbe, MemorySample, MemorySampler, MemoryStatus, PressureLevel, SampleOutcome};
use crate::network::{
    ConnectivityProbe, NetworkChange, NetworkQualityObserver, NetworkSignal, NetworkState, NetworkStrategy,
    RetryingRequestExecutor,
};
use crate::tasks::{spawn_cleanup_task, spawn_network_task, spawn_sampling_task};

/// Releases application-level cached state during an emergency cleanup.
pub type StateReleaser = Arc<dyn Fn() + Send + Sync>;

/// Host garbage-collection hint.
pub type GcHint = Arc<dyn Fn() + Send + Sync>;

// == Visibility ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Foreground,
    Background,
}

/// What a visibility change did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum LifecycleOutcome {
    /// Moved to background: caches were trimmed
    Cleaned { report: CleanupReport },
    /// Returned to foreground: critical pages were invalidated
    Invalidated { entries: usize },
    /// Already in that state
    Unchanged,
}

/// Diagnostics view of the whole subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub visibility: Visibility,
    pub memory: MemoryStatus,
    pub network: NetworkState,
    pub strategy: NetworkStrategy,
    pub caches: Vec<CacheSnapshot>,
    pub last_cleanup: Option<CleanupReport>,
}

#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    config: OrchestratorConfig,
    sampler_config: SamplerConfig,
    sweep_interval: std::time::Duration,
    sampler: Mutex<MemorySampler>,
    probe: Arc<dyn MemoryProbe>,
    observer: Arc<NetworkQualityObserver>,
    executor: Arc<RetryingRequestExecutor>,
    connectivity: RwLock<Option<Arc<dyn ConnectivityProbe>>>,
    caches: RwLock<Vec<Arc<dyn ManagedCache>>>,
    releasers: RwLock<Vec<StateReleaser>>,
    gc_hint: RwLock<Option<GcHint>>,
    events: EventBus,
    visibility: Mutex<Visibility>,
    last_cleanup: Mutex<Option<CleanupReport>>,
    lifecycle: Mutex<Lifecycle>,
}

// == Resource Orchestrator ==
#[derive(Clone)]
pub struct ResourceOrchestrator {
    inner: Arc<Inner>,
}

impl ResourceOrchestrator {
    /// Creates an idle orchestrator. Register caches, then call [`init`](Self::init).
    ///
    /// # Arguments
    /// * `config` - Subsystem configuration
    /// * `observer` - Network quality source, shared with the executor
    /// * `executor` - Request executor, exposed for diagnostics
    /// * `probe` - Memory reading source for the sampling task
    pub fn new(
        config: &Config,
        observer: Arc<NetworkQualityObserver>,
        executor: Arc<RetryingRequestExecutor>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let sampler = MemorySampler::new(
            config.sampler.thresholds,
            config.sampler.leak,
            config.sampler.history_capacity,
        );

        Self {
            inner: Arc::new(Inner {
                config: config.orchestrator.clone(),
                sampler_config: config.sampler.clone(),
                sweep_interval: config.page_cache.sweep_interval,
                sampler: Mutex::new(sampler),
                probe,
                observer,
                executor,
                connectivity: RwLock::new(None),
                caches: RwLock::new(Vec::new()),
                releasers: RwLock::new(Vec::new()),
                gc_hint: RwLock::new(None),
                events: EventBus::new(),
                visibility: Mutex::new(Visibility::Foreground),
                last_cleanup: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    // == Registration ==
    pub fn register_cache(&self, cache: Arc<dyn ManagedCache>) {
        debug!("Registered cache {}", cache.name());
        self.inner.caches.write().push(cache);
    }

    /// Adds a callback run by every emergency cleanup.
    pub fn register_state_releaser<F>(&self, releaser: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.releasers.write().push(Arc::new(releaser));
    }

    /// Sets the garbage-collection hint issued after an emergency cleanup.
    pub fn set_gc_hint<F>(&self, hint: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.gc_hint.write() = Some(Arc::new(hint));
    }

    /// Polls `probe` for connectivity once running.
    pub fn set_connectivity_probe(&self, probe: Arc<dyn ConnectivityProbe>) {
        *self.inner.connectivity.write() = Some(probe);
    }

    // == Accessors ==
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn observer(&self) -> &Arc<NetworkQualityObserver> {
        &self.inner.observer
    }

    pub fn executor(&self) -> &Arc<RetryingRequestExecutor> {
        &self.inner.executor
    }

    pub fn pressure_level(&self) -> PressureLevel {
        self.inner.sampler.lock().level()
    }

    pub fn memory_status(&self) -> MemoryStatus {
        self.inner.sampler.lock().status()
    }

    pub fn visibility(&self) -> Visibility {
        *self.inner.visibility.lock()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().cancel.is_some()
    }

    fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        self.inner.caches.read().clone()
    }

    // == Lifecycle ==
    /// Starts the sweep, sampling and network tasks. A second call is a no-op.
    pub fn init(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.cancel.is_some() {
            debug!("Orchestrator already running");
            return;
        }

        let cancel = CancellationToken::new();
        let caches = self.caches();
        for cache in &caches {
            lifecycle.handles.push(spawn_cleanup_task(
                cache.clone(),
                self.inner.sweep_interval,
                cancel.child_token(),
            ));
        }

        lifecycle.handles.push(spawn_sampling_task(
            self.clone(),
            self.inner.sampler_config.interval,
            self.inner.sampler_config.fast_interval,
            cancel.child_token(),
        ));

        if let Some(probe) = self.inner.connectivity.read().clone() {
            lifecycle.handles.push(spawn_network_task(
                self.clone(),
                probe,
                self.inner.config.network_poll_interval,
                cancel.child_token(),
            ));
        }

        info!(
            "Resource orchestrator started: {} caches, {} background tasks",
            caches.len(),
            lifecycle.handles.len()
        );
        lifecycle.cancel = Some(cancel);
    }

    /// Stops every background task, then clears all caches so outstanding
    /// asset handles are released.
    pub async fn shutdown(&self) -> CleanupReport {
        let (cancel, handles) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            (lifecycle.cancel.take(), std::mem::take(&mut lifecycle.handles))
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        let mut report = CleanupReport::new(CleanupMode::Emergency, CleanupReason::Shutdown);
        for cache in self.caches() {
            let result = cache.clear_all().await;
            report.add(cache.name(), result);
        }
        info!("Resource orchestrator stopped; released {}", report.total);
        self.finish_cleanup(report)
    }

    // == Memory Pressure ==
    /// Reads the memory probe and records the sample.
    pub async fn sample_now(&self) -> Option<SampleOutcome> {
        let sample = self.inner.probe.sample()?;
        Some(self.record_sample(sample).await)
    }

    /// Records a sample and reacts to an upward pressure move or a new leak.
    ///
    /// Medium only warns; high trims every cache; critical clears
    /// everything, runs the state releasers and issues the GC hint.
    pub async fn record_sample(&self, sample: MemorySample) -> SampleOutcome {
        let outcome = self.inner.sampler.lock().record(sample);

        if let Some(transition) = outcome.transition {
            self.inner.events.emit(ResourceEvent::Pressure {
                previous: transition.from,
                level: transition.to,
                usage_ratio: sample.usage_ratio(),
            });

            match transition.to {
                PressureLevel::Low => {}
                PressureLevel::Medium => {
                    warn!(
                        "Memory pressure medium: {:.1}% of limit in use",
                        sample.usage_ratio() * 100.0
                    );
                }
                PressureLevel::High => {
                    self.cleanup(CleanupMode::Conservative, CleanupReason::Pressure(PressureLevel::High))
                        .await;
                }
                PressureLevel::Critical => {
                    self.cleanup(CleanupMode::Emergency, CleanupReason::Pressure(PressureLevel::Critical))
                        .await;
                }
            }
        }

        if let Some(report) = outcome.leak {
            self.inner.events.emit(ResourceEvent::LeakDetected(report));
        }

        outcome
    }

    // == Cleanup ==
    /// Runs a cleanup across every registered cache.
    ///
    /// Conservative trims the configured share of each cache. Emergency
    /// clears them, then releases application state and hints the GC.
    pub async fn cleanup(&self, mode: CleanupMode, reason: CleanupReason) -> CleanupReport {
        let mut report = CleanupReport::new(mode, reason);
        let fraction = self.inner.config.conservative_fraction;

        for cache in self.caches() {
            let result = match mode {
                CleanupMode::Conservative => cache.trim(fraction).await,
                CleanupMode::Emergency => cache.clear_all().await,
            };
            report.add(cache.name(), result);
        }

        if mode == CleanupMode::Emergency {
            let releasers = self.inner.releasers.read().clone();
            for release in &releasers {
                release();
            }
            report.states_released = releasers.len();

            if let Some(hint) = self.inner.gc_hint.read().clone() {
                hint();
                report.gc_hinted = true;
            }
        }

        match mode {
            CleanupMode::Conservative => info!("Conservative cleanup ({:?}): removed {}", reason, report.total),
            CleanupMode::Emergency => warn!(
                "Emergency cleanup ({:?}): removed {}, released {} states",
                reason, report.total, report.states_released
            ),
        }
        self.finish_cleanup(report)
    }

    fn finish_cleanup(&self, report: CleanupReport) -> CleanupReport {
        *self.inner.last_cleanup.lock() = Some(report.clone());
        self.inner.events.emit(ResourceEvent::CleanupCompleted(report.clone()));
        report
    }

    // == Visibility ==
    /// Reacts to the host moving between foreground and background.
    ///
    /// Background trims every cache. Foreground invalidates the pages of
    /// the configured critical resources so the next read is fresh.
    pub async fn on_visibility_change(&self, visibility: Visibility) -> LifecycleOutcome {
        {
            let mut current = self.inner.visibility.lock();
            if *current == visibility {
                return LifecycleOutcome::Unchanged;
            }
            *current = visibility;
        }

        match visibility {
            Visibility::Background => {
                let report = self
                    .cleanup(CleanupMode::Conservative, CleanupReason::Background)
                    .await;
                LifecycleOutcome::Cleaned { report }
            }
            Visibility::Foreground => {
                let resources = &self.inner.config.critical_resources;
                let mut entries = 0;
                if !resources.is_empty() {
                    for cache in self.caches() {
                        entries += cache.invalidate_resources(resources).await;
                    }
                }
                info!("Foreground: invalidated {} critical entries", entries);
                LifecycleOutcome::Invalidated { entries }
            }
        }
    }

    // == Network ==
    /// Feeds a connectivity reading to the observer. On a tier change the
    /// new strategy is applied to every cache and a network-change event is
    /// emitted.
    pub async fn observe_network(&self, signal: &NetworkSignal) -> Option<NetworkChange> {
        let change = self.inner.observer.observe(signal)?;

        for cache in self.caches() {
            cache.apply_strategy(change.strategy).await;
        }

        self.inner.events.emit(ResourceEvent::NetworkChange(change.clone()));
        Some(change)
    }

    // == Status ==
    pub async fn status(&self) -> OrchestratorStatus {
        let mut caches = Vec::new();
        for cache in self.caches() {
            caches.push(cache.snapshot().await);
        }

        OrchestratorStatus {
            running: self.is_running(),
            visibility: self.visibility(),
            memory: self.memory_status(),
            network: self.inner.observer.current(),
            strategy: self.inner.observer.strategy(),
            caches,
            last_cleanup: self.inner.last_cleanup.lock().clone(),
        }
    }
}
