//! Agent store (C5).
//!
//! Holds configuration records for every agent the host knows about —
//! provider, model, temperature, API key, system prompt, enabled tool/plugin
//! names — separately from the live in-memory transcript the chat
//! orchestrator keeps for it. Settings and the plugin list are persisted
//! under `agent_store_path`; the transcript is deliberately never written to
//! disk (see the transcript-persistence design note).

use crate::ori::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// A record of one configured agent, independent of whether its live
/// chat-loop object is currently instantiated in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub settings: AgentSettings,
    #[serde(default)]
    pub enabled_plugins: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct AgentsIndex {
    agents: Vec<AgentRecord>,
}

struct Inner {
    records: HashMap<String, AgentRecord>,
    active_agent: Option<String>,
}

/// File-backed store of agent configuration records.
///
/// `<root>/agents.json` holds the index; `<root>/agents/<name>/agent_settings.json`
/// and `<root>/agents/<name>/<plugin>_settings.json` hold per-agent and
/// per-agent-per-plugin settings, per the persisted layout in spec §6.
pub struct AgentStore {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl AgentStore {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                active_agent: None,
            }),
        })
    }

    /// Load `<root>/agents.json` into memory, if present. A missing file
    /// means a fresh store, not an error.
    pub async fn load(&self) -> ApiResult<()> {
        let index_path = self.root.join("agents.json");
        if !index_path.exists() {
            return Ok(());
        }
        let bytes = tokio::fs::read(&index_path)
            .await
            .map_err(|e| ApiError::internal(format!("reading agents.json: {e}")))?;
        let index: AgentsIndex = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::internal(format!("parsing agents.json: {e}")))?;
        let mut inner = self.inner.lock().await;
        for record in index.agents {
            inner.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn persist_index(&self, inner: &Inner) -> ApiResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let index = AgentsIndex {
            agents: inner.records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&index).map_err(|e| ApiError::internal(e.to_string()))?;
        let tmp_path = self.root.join("agents.json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        tokio::fs::rename(&tmp_path, self.root.join("agents.json"))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }

    fn agent_dir(&self, name: &str) -> PathBuf {
        self.root.join("agents").join(name)
    }

    /// Create a new agent record and persist it. `id` is caller-supplied
    /// (e.g. the same value as `name`, or a generated uuid) to keep the
    /// record addressable independently of display-name renames.
    pub async fn create(&self, record: AgentRecord) -> ApiResult<AgentRecord> {
        let mut inner = self.inner.lock().await;
        if inner.records.values().any(|r| r.name == record.name) {
            return Err(ApiError::conflict(format!("agent '{}' already exists", record.name)));
        }
        inner.records.insert(record.id.clone(), record.clone());
        self.persist_index(&inner).await?;
        drop(inner);

        tokio::fs::create_dir_all(self.agent_dir(&record.name))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        self.write_agent_settings(&record.name, &record.settings).await?;
        Ok(record)
    }

    pub async fn write_agent_settings(&self, agent_name: &str, settings: &AgentSettings) -> ApiResult<()> {
        let dir = self.agent_dir(agent_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(settings).map_err(|e| ApiError::internal(e.to_string()))?;
        tokio::fs::write(dir.join("agent_settings.json"), bytes)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn write_plugin_settings(
        &self,
        agent_name: &str,
        plugin_name: &str,
        settings: &serde_json::Value,
    ) -> ApiResult<()> {
        let dir = self.agent_dir(agent_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(settings).map_err(|e| ApiError::internal(e.to_string()))?;
        tokio::fs::write(dir.join(format!("{plugin_name}_settings.json")), bytes)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> ApiResult<AgentRecord> {
        self.inner
            .lock()
            .await
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("agent '{id}' not found")))
    }

    pub async fn get_by_name(&self, name: &str) -> Option<AgentRecord> {
        self.inner
            .lock()
            .await
            .records
            .values()
            .find(|r| r.name == name)
            .cloned()
    }

    pub async fn list(&self) -> Vec<AgentRecord> {
        self.inner.lock().await.records.values().cloned().collect()
    }

    pub async fn remove(&self, id: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .remove(id)
            .ok_or_else(|| ApiError::not_found(format!("agent '{id}' not found")))?;
        if inner.active_agent.as_deref() == Some(id) {
            inner.active_agent = None;
        }
        self.persist_index(&inner).await?;
        drop(inner);
        let _ = tokio::fs::remove_dir_all(self.agent_dir(&record.name)).await;
        Ok(())
    }

    pub async fn update_settings(&self, id: &str, settings: AgentSettings) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("agent '{id}' not found")))?;
        record.settings = settings.clone();
        record.updated_at = chrono::Utc::now();
        let name = record.name.clone();
        self.persist_index(&inner).await?;
        drop(inner);
        self.write_agent_settings(&name, &settings).await
    }

    /// Enable a plugin on the named agent's `enabled_plugins` list.
    pub async fn enable_plugin(&self, id: &str, plugin_name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("agent '{id}' not found")))?;
        if !record.enabled_plugins.iter().any(|p| p == plugin_name) {
            record.enabled_plugins.push(plugin_name.to_string());
        }
        record.updated_at = chrono::Utc::now();
        self.persist_index(&inner).await
    }

    /// Disable a plugin on the named agent's `enabled_plugins` list.
    pub async fn disable_plugin(&self, id: &str, plugin_name: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("agent '{id}' not found")))?;
        record.enabled_plugins.retain(|p| p != plugin_name);
        record.updated_at = chrono::Utc::now();
        self.persist_index(&inner).await
    }

    pub async fn switch_active(&self, id: &str) -> ApiResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.records.contains_key(id) {
            return Err(ApiError::not_found(format!("agent '{id}' not found")));
        }
        inner.active_agent = Some(id.to_string());
        Ok(())
    }

    pub async fn active_agent(&self) -> Option<String> {
        self.inner.lock().await.active_agent.clone()
    }
}

pub fn default_agent_store_path() -> PathBuf {
    PathBuf::from("agent_store")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> AgentRecord {
        let now = chrono::Utc::now();
        AgentRecord {
            id: name.to_string(),
            name: name.to_string(),
            agent_type: "assistant".to_string(),
            settings: AgentSettings {
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                temperature: 0.7,
                api_key: None,
                system_prompt: None,
                max_tokens: 4096,
            },
            enabled_plugins: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::new(dir.path());
        store.create(sample("alice")).await.unwrap();
        let fetched = store.get("alice").await.unwrap();
        assert_eq!(fetched.name, "alice");
        assert!(dir.path().join("agents.json").exists());
        assert!(dir.path().join("agents/alice/agent_settings.json").exists());
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::new(dir.path());
        store.create(sample("alice")).await.unwrap();
        let err = store.create(sample("alice")).await.unwrap_err();
        assert_eq!(err.code, crate::ori::error::ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn remove_clears_active_agent() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::new(dir.path());
        store.create(sample("alice")).await.unwrap();
        store.switch_active("alice").await.unwrap();
        store.remove("alice").await.unwrap();
        assert_eq!(store.active_agent().await, None);
    }

    #[tokio::test]
    async fn load_restores_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = AgentStore::new(dir.path());
            store.create(sample("alice")).await.unwrap();
        }
        let store = AgentStore::new(dir.path());
        store.load().await.unwrap();
        assert_eq!(store.list().await.len(), 1);
    }
}
