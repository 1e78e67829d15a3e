//! Notification service (C11).
//!
//! A universal-filter subscriber sitting on the [`event_bus`](crate::ori::event_bus):
//! every bus event is turned into a [`Notification`] or skipped, broadcast to
//! per-agent subscriber channels, and kept in a bounded ring buffer for
//! clients that connect to `/api/orchestration/notifications/stream` after
//! the fact.

use crate::ori::event_bus::{Event, EventBus};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    fn from_topic(topic: &str) -> Self {
        match topic {
            "task.failed" | "task.timeout" | "workflow.failed" | "step.failed"
            | "plugin.unhealthy" | "error" => Severity::Error,
            "plugin.degraded" | "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    /// Empty string means broadcast to every agent; see [`is_relevant_to`].
    pub agent_name: String,
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub unread: bool,
}

impl Notification {
    fn from_event(event: &Event) -> Self {
        let agent_name = event
            .data
            .get("agent_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Self {
            id: event.id.clone(),
            severity: Severity::from_topic(&event.event_type),
            title: event.event_type.clone(),
            agent_name,
            data: event.data.clone(),
            created_at: event.timestamp,
            unread: true,
        }
    }

    /// Broadcast notifications (`agent_name == ""`) are relevant to everyone;
    /// otherwise only the named agent sees it.
    pub fn is_relevant_to(&self, agent: &str) -> bool {
        self.agent_name.is_empty() || self.agent_name == agent
    }
}

const DEFAULT_RING_CAPACITY: usize = 1000;
const SUBSCRIBER_CAPACITY: usize = 100;

struct Inner {
    ring: VecDeque<Notification>,
    capacity: usize,
    subscribers: HashMap<String, Vec<mpsc::Sender<Notification>>>,
}

/// Owns the notification ring and per-agent fan-out. Construct once per
/// process with [`NotificationService::spawn`], which subscribes itself to
/// the event bus and runs the translation loop as a background task.
pub struct NotificationService {
    inner: Mutex<Inner>,
}

impl NotificationService {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(capacity),
                capacity,
                subscribers: HashMap::new(),
            }),
        })
    }

    /// Subscribe to the event bus and spawn the background translation task.
    pub fn spawn(event_bus: Arc<EventBus>) -> Arc<Self> {
        let service = Self::new(DEFAULT_RING_CAPACITY);
        let service_for_task = Arc::clone(&service);
        tokio::spawn(async move {
            let (_id, mut rx) = event_bus.subscribe().await;
            while let Some(event) = rx.recv().await {
                service_for_task.ingest(Notification::from_event(&event)).await;
            }
        });
        service
    }

    async fn ingest(&self, notification: Notification) {
        let mut inner = self.inner.lock().await;
        if inner.ring.len() >= inner.capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(notification.clone());

        for (agent, senders) in inner.subscribers.iter() {
            if !notification.is_relevant_to(agent) {
                continue;
            }
            for sender in senders {
                if sender.try_send(notification.clone()).is_err() {
                    log::warn!("notification channel for agent '{agent}' full or closed");
                }
            }
        }
    }

    /// Subscribe a consumer to future notifications relevant to `agent`
    /// (pass `""` to receive broadcasts only).
    pub async fn subscribe(&self, agent: &str) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.inner
            .lock()
            .await
            .subscribers
            .entry(agent.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Return the last `limit` notifications relevant to `agent`, most
    /// recent first.
    pub async fn recent_for(&self, agent: &str, limit: usize) -> Vec<Notification> {
        let inner = self.inner.lock().await;
        inner
            .ring
            .iter()
            .rev()
            .filter(|n| n.is_relevant_to(agent))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Mark a notification as read by id. Returns false if not found.
    pub async fn mark_read(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if let Some(n) = inner.ring.iter_mut().find(|n| n.id == id) {
            n.unread = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn event(event_type: &str, agent_name: Option<&str>) -> Event {
        let mut data = Map::new();
        if let Some(agent) = agent_name {
            data.insert("agent_name".into(), serde_json::json!(agent));
        }
        Event {
            id: "1-000001".into(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now(),
            workspace_id: None,
            data,
        }
    }

    #[tokio::test]
    async fn broadcast_notification_reaches_every_agent() {
        let service = NotificationService::new(10);
        service.ingest(Notification::from_event(&event("task.created", None))).await;
        let recent = service.recent_for("alice", 10).await;
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn agent_scoped_notification_is_filtered() {
        let service = NotificationService::new(10);
        service
            .ingest(Notification::from_event(&event("task.failed", Some("bob"))))
            .await;
        assert_eq!(service.recent_for("alice", 10).await.len(), 0);
        assert_eq!(service.recent_for("bob", 10).await.len(), 1);
        assert_eq!(
            service.recent_for("bob", 10).await[0].severity,
            Severity::Error
        );
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_past_capacity() {
        let service = NotificationService::new(2);
        for i in 0..3 {
            let mut e = event("warning", None);
            e.id = format!("id-{i}");
            service.ingest(Notification::from_event(&e)).await;
        }
        let recent = service.recent_for("", 10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "id-2");
        assert_eq!(recent[1].id, "id-1");
    }
}
