//! Network Quality Observer
//!
//! Holds the current classified network state and publishes it on a
//! `tokio::sync::watch` channel. Receivers are only woken when the quality
//! classification changes, not on every raw signal.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::network::{NetworkQuality, NetworkSignal, NetworkState, NetworkStrategy};

/// Emitted when the quality classification changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkChange {
    pub previous: NetworkQuality,
    pub current: NetworkState,
    pub strategy: NetworkStrategy,
}

/// Source of raw connectivity readings polled by the network task.
pub trait ConnectivityProbe: Send + Sync {
    fn probe(&self) -> Option<NetworkSignal>;
}

// == Network Quality Observer ==
#[derive(Debug)]
pub struct NetworkQualityObserver {
    sender: watch::Sender<NetworkState>,
}

impl NetworkQualityObserver {
    /// Creates an observer seeded with an initial signal.
    pub fn new(initial: &NetworkSignal) -> Self {
        let (sender, _) = watch::channel(NetworkState::from_signal(initial));
        Self { sender }
    }

    /// Receiver that wakes on every quality change.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> NetworkState {
        self.sender.borrow().clone()
    }

    pub fn quality(&self) -> NetworkQuality {
        self.sender.borrow().quality
    }

    pub fn is_online(&self) -> bool {
        self.sender.borrow().online
    }

    pub fn strategy(&self) -> NetworkStrategy {
        self.sender.borrow().strategy()
    }

    /// Folds a raw signal into the state.
    ///
    /// Returns `Some` only when the classification changed. Bandwidth updates
    /// within the same tier are stored without waking receivers.
    pub fn observe(&self, signal: &NetworkSignal) -> Option<NetworkChange> {
        let next = NetworkState::from_signal(signal);
        let mut previous = None;

        self.sender.send_if_modified(|state| {
            if state.quality == next.quality {
                state.estimated_bandwidth_mbps = next.estimated_bandwidth_mbps;
                state.effective_type = next.effective_type;
                false
            } else {
                previous = Some(state.quality);
                *state = next.clone();
                true
            }
        });

        match previous {
            Some(previous) => {
                info!(
                    "Network quality changed: {} -> {}",
                    previous.as_str(),
                    next.quality.as_str()
                );
                Some(NetworkChange {
                    previous,
                    strategy: next.strategy(),
                    current: next,
                })
            }
            None => {
                debug!("Network signal within {} tier", next.quality.as_str());
                None
            }
        }
    }
}
