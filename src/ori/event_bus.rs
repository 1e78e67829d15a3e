//! Host-wide event bus (C10).
//!
//! Distinct from [`event`](crate::ori::event), which carries an individual
//! agent's fine-grained LLM-call lifecycle to an in-process [`EventHandler`]
//! callback. This bus is the cross-component publish/subscribe backbone used
//! by the plugin supervisor, health manager, communicator, and workflow
//! engine to announce state changes to the notification service and the
//! `/api/orchestration/*` SSE streams, with no caller-specific callback
//! wiring required.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// The fixed vocabulary of topics the bus carries. Any other string is
/// rejected by [`EventBus::publish`] at the call site via [`Topic::parse`].
pub const TOPICS: &[&str] = &[
    "task.created",
    "task.completed",
    "task.failed",
    "task.timeout",
    "workspace.created",
    "workspace.updated",
    "workspace.completed",
    "workflow.started",
    "workflow.completed",
    "workflow.failed",
    "step.started",
    "step.completed",
    "step.failed",
    "error",
    "warning",
    "plugin.healthy",
    "plugin.degraded",
    "plugin.unhealthy",
    "update.available",
];

/// A single published occurrence.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub data: HashMap<String, serde_json::Value>,
}

/// Per-subscriber channel capacity. A full channel means a slow subscriber;
/// the publisher does not block for it, the event is simply dropped for
/// that one subscriber and a warning is logged.
const SUBSCRIBER_CAPACITY: usize = 100;

struct Subscription {
    id: u64,
    sender: mpsc::Sender<Event>,
}

/// Host-wide fan-out event bus.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscription>>,
    next_sub_id: AtomicU64,
    next_event_seq: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(Vec::new()),
            next_sub_id: AtomicU64::new(1),
            next_event_seq: AtomicU64::new(0),
        })
    }

    /// Subscribe to every event published from now on. Returns the
    /// subscription id (for [`unsubscribe`](Self::unsubscribe)) and the
    /// receiving half of a bounded channel.
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<Event>) {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers
            .write()
            .await
            .push(Subscription { id, sender: tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.write().await.retain(|s| s.id != id);
    }

    /// Publish an event under `event_type` (must be one of [`TOPICS`]).
    /// Fans out to every live subscriber under a read lock; a subscriber
    /// whose channel is full is skipped, not blocked on.
    pub async fn publish(
        &self,
        event_type: &str,
        workspace_id: Option<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> Event {
        debug_assert!(
            TOPICS.contains(&event_type),
            "publishing on an undeclared topic: {event_type}"
        );
        let seq = self.next_event_seq.fetch_add(1, Ordering::SeqCst);
        let timestamp = chrono::Utc::now();
        let event = Event {
            id: format!("{}-{:06}", timestamp.timestamp_millis(), seq),
            event_type: event_type.to_string(),
            timestamp,
            workspace_id,
            data,
        };

        let subscribers = self.subscribers.read().await;
        for sub in subscribers.iter() {
            if sub.sender.try_send(event.clone()).is_err() {
                log::warn!(
                    "event_bus: subscriber {} channel full or closed, dropping {}",
                    sub.id,
                    event.event_type
                );
            }
        }
        event
    }
}

impl Default for EventBus {
    fn default() -> Self {
        // `new()` returns an Arc because every real caller needs shared
        // ownership; `Default` is provided only so `EventBus` itself can sit
        // inside other `Default`-derived structs during tests.
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_sub_id: AtomicU64::new(1),
            next_event_seq: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let (_id_a, mut rx_a) = bus.subscribe().await;
        let (_id_b, mut rx_b) = bus.subscribe().await;

        bus.publish("task.created", Some("ws-1".into()), HashMap::new())
            .await;

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a.event_type, "task.created");
        assert_eq!(b.event_type, "task.created");
        assert_eq!(a.workspace_id.as_deref(), Some("ws-1"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe().await;
        bus.unsubscribe(id).await;

        bus.publish("warning", None, HashMap::new()).await;
        // Channel is dropped, so recv resolves to None rather than hanging.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_is_skipped_not_blocked() {
        let bus = EventBus::new();
        let (_id, rx) = bus.subscribe().await;
        // Fill the channel without draining it.
        for _ in 0..SUBSCRIBER_CAPACITY {
            bus.publish("warning", None, HashMap::new()).await;
        }
        // This publish must return promptly even though the subscriber's
        // channel is saturated.
        bus.publish("warning", None, HashMap::new()).await;
        drop(rx);
    }
}
