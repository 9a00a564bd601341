//! Resource Events
//!
//! Named notifications for the host application, delivered through an
//! explicit subscriber registry and a broadcast channel for async listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::memory::{LeakReport, PressureLevel};
use crate::network::NetworkChange;
use crate::orchestrator::CleanupReport;

const CHANNEL_CAPACITY: usize = 64;

// == Event ==
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ResourceEvent {
    /// The pressure level moved up
    Pressure {
        previous: PressureLevel,
        level: PressureLevel,
        usage_ratio: f64,
    },
    LeakDetected(LeakReport),
    NetworkChange(NetworkChange),
    CleanupCompleted(CleanupReport),
}

impl ResourceEvent {
    /// Event name hosts subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceEvent::Pressure { .. } => "pressure",
            ResourceEvent::LeakDetected(_) => "leak-detected",
            ResourceEvent::NetworkChange(_) => "network-change",
            ResourceEvent::CleanupCompleted(_) => "cleanup-completed",
        }
    }
}

// == Event Bus ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ResourceEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    /// `None` receives every event
    name: Option<&'static str>,
    listener: Listener,
}

/// Subscriber registry. Listeners run synchronously on the emitting task
/// and must not block.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<ResourceEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            sender,
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for every event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ResourceEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(listener))
    }

    /// Registers `listener` for events named `name`.
    pub fn subscribe_to<F>(&self, name: &'static str, listener: F) -> SubscriptionId
    where
        F: Fn(&ResourceEvent) + Send + Sync + 'static,
    {
        self.add(Some(name), Arc::new(listener))
    }

    fn add(&self, name: Option<&'static str>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, name, listener });
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Channel receiver for async consumers. Slow receivers lag and lose
    /// the oldest events.
    pub fn listen(&self) -> broadcast::Receiver<ResourceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Delivers `event` to matching listeners, then to channel receivers.
    pub fn emit(&self, event: ResourceEvent) {
        let name = event.name();

        // Snapshot so listeners may subscribe or unsubscribe while running
        let listeners: Vec<Listener> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.name.map_or(true, |n| n == name))
            .map(|s| s.listener.clone())
            .collect();

        debug!("Emitting {} to {} listeners", name, listeners.len());
        for listener in listeners {
            listener(&event);
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn pressure(level: PressureLevel) -> ResourceEvent {
        ResourceEvent::Pressure {
            previous: PressureLevel::Low,
            level,
            usage_ratio: 0.9,
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let id = bus.subscribe(move |e| sink.lock().push(e.name()));
        bus.emit(pressure(PressureLevel::High));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(pressure(PressureLevel::Critical));

        assert_eq!(*seen.lock(), vec!["pressure"]);
    }

    #[test]
    fn test_named_subscription_filters() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();

        bus.subscribe_to("leak-detected", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(pressure(PressureLevel::Medium));
        bus.emit(ResourceEvent::LeakDetected(LeakReport::default()));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.listen();

        bus.emit(pressure(PressureLevel::High));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, pressure(PressureLevel::High));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(pressure(PressureLevel::High)).unwrap();
        assert_eq!(json["event"], "pressure");
        assert_eq!(json["level"], "high");
        assert_eq!(json["previous"], "low");
    }
}
