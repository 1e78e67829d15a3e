//! Workspace store (C7).
//!
//! A workspace is a shared message/task board for a group of agents. Each
//! workspace lives in exactly one JSON file (`<root>/workspaces/<id>.json`);
//! the in-memory copy is authoritative for reads, and every write takes the
//! workspace's own mutex, mutates the in-memory copy, then serializes the
//! whole file out (truncate + atomic rename) so a reader never observes a
//! partially-written file.

use crate::ori::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from_agent: String,
    pub to_agent: Option<String>,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workspace_id: String,
    pub assignee: String,
    pub assigned_by: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Zero means "no timeout enforced".
    #[serde(default)]
    pub timeout_seconds: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub in_progress: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceData {
    pub id: String,
    pub name: String,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub parent_agent: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tasks: HashMap<String, Task>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl WorkspaceData {
    pub fn new(id: impl Into<String>, name: impl Into<String>, parent_agent: Option<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status: WorkspaceStatus::Active,
            members: Vec::new(),
            parent_agent,
            messages: Vec::new(),
            tasks: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A sender/recipient must be a workspace member or the workspace's
    /// owning parent agent.
    fn is_member(&self, agent: &str) -> bool {
        self.members.iter().any(|m| m == agent) || self.parent_agent.as_deref() == Some(agent)
    }
}

struct Entry {
    data: WorkspaceData,
}

/// File-backed store of workspaces, one JSON file per workspace, each
/// guarded by its own lock so unrelated workspaces never contend.
pub struct WorkspaceStore {
    root: PathBuf,
    cache: Mutex<HashMap<String, Arc<Mutex<Entry>>>>,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join("workspaces").join(format!("{id}.json"))
    }

    async fn entry_for(&self, id: &str) -> ApiResult<Arc<Mutex<Entry>>> {
        if let Some(entry) = self.cache.lock().await.get(id).cloned() {
            return Ok(entry);
        }
        let path = self.path_for(id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| ApiError::not_found(format!("workspace '{id}' not found")))?;
        let data: WorkspaceData =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::internal(e.to_string()))?;
        let entry = Arc::new(Mutex::new(Entry { data }));
        self.cache.lock().await.insert(id.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    async fn persist(&self, data: &WorkspaceData) -> ApiResult<()> {
        let dir = self.root.join("workspaces");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(data).map_err(|e| ApiError::internal(e.to_string()))?;
        let tmp_path = dir.join(format!("{}.json.tmp", data.id));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        tokio::fs::rename(&tmp_path, self.path_for(&data.id))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }

    pub async fn create(&self, id: &str, name: &str, parent_agent: Option<String>) -> ApiResult<WorkspaceData> {
        let data = WorkspaceData::new(id, name, parent_agent);
        self.persist(&data).await?;
        self.cache
            .lock()
            .await
            .insert(id.to_string(), Arc::new(Mutex::new(Entry { data: data.clone() })));
        Ok(data)
    }

    pub async fn get(&self, id: &str) -> ApiResult<WorkspaceData> {
        let entry = self.entry_for(id).await?;
        let guard = entry.lock().await;
        Ok(guard.data.clone())
    }

    pub async fn set_status(&self, id: &str, status: WorkspaceStatus) -> ApiResult<()> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        guard.data.status = status;
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn rename(&self, id: &str, name: &str) -> ApiResult<WorkspaceData> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        guard.data.name = name.to_string();
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn add_agent(&self, id: &str, agent: &str) -> ApiResult<()> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        if !guard.data.members.iter().any(|m| m == agent) {
            guard.data.members.push(agent.to_string());
        }
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn remove_agent(&self, id: &str, agent: &str) -> ApiResult<()> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        guard.data.members.retain(|m| m != agent);
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn add_message(&self, id: &str, message: Message) -> ApiResult<()> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        if !guard.data.is_member(&message.from_agent) {
            return Err(ApiError::validation(format!(
                "'{}' is not a member of workspace '{id}'",
                message.from_agent
            )));
        }
        if let Some(to) = &message.to_agent {
            if !guard.data.is_member(to) {
                return Err(ApiError::validation(format!(
                    "'{to}' is not a member of workspace '{id}'"
                )));
            }
        }
        guard.data.messages.push(message);
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn messages_for_agent(&self, id: &str, agent: &str) -> ApiResult<Vec<Message>> {
        let data = self.get(id).await?;
        Ok(data
            .messages
            .into_iter()
            .filter(|m| m.from_agent == agent || m.to_agent.as_deref() == Some(agent) || m.to_agent.is_none())
            .collect())
    }

    pub async fn messages_since(&self, id: &str, since: chrono::DateTime<chrono::Utc>) -> ApiResult<Vec<Message>> {
        let data = self.get(id).await?;
        Ok(data.messages.into_iter().filter(|m| m.created_at > since).collect())
    }

    pub async fn add_task(&self, id: &str, task: Task) -> ApiResult<()> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        guard.data.tasks.insert(task.id.clone(), task);
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn get_task(&self, id: &str, task_id: &str) -> ApiResult<Task> {
        let data = self.get(id).await?;
        data.tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("task '{task_id}' not found in workspace '{id}'")))
    }

    pub async fn update_task<F>(&self, id: &str, task_id: &str, mutate: F) -> ApiResult<Task>
    where
        F: FnOnce(&mut Task),
    {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        let task = guard
            .data
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ApiError::not_found(format!("task '{task_id}' not found in workspace '{id}'")))?;
        mutate(task);
        let updated = task.clone();
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    pub async fn remove_task(&self, id: &str, task_id: &str) -> ApiResult<()> {
        let entry = self.entry_for(id).await?;
        let mut guard = entry.lock().await;
        guard.data.tasks.remove(task_id);
        guard.data.updated_at = chrono::Utc::now();
        let snapshot = guard.data.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn task_stats(&self, id: &str) -> ApiResult<TaskStats> {
        let data = self.get(id).await?;
        let mut stats = TaskStats::default();
        for task in data.tasks.values() {
            stats.total += 1;
            match task.status {
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Timeout => stats.timed_out += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Assigned => {}
            }
        }
        Ok(stats)
    }

    pub async fn list_ids(&self) -> ApiResult<Vec<String>> {
        let dir = self.root.join("workspaces");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| ApiError::internal(e.to_string()))? {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path());
        store.create("ws-1", "planning", None).await.unwrap();
        let ws = store.get("ws-1").await.unwrap();
        assert_eq!(ws.name, "planning");
        assert!(dir.path().join("workspaces/ws-1.json").exists());
    }

    #[tokio::test]
    async fn message_from_non_member_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path());
        store.create("ws-1", "planning", None).await.unwrap();
        let err = store
            .add_message(
                "ws-1",
                Message {
                    id: "m1".into(),
                    from_agent: "stranger".into(),
                    to_agent: None,
                    content: "hi".into(),
                    created_at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::ori::error::ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn task_stats_reflect_status_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path());
        store.create("ws-1", "planning", None).await.unwrap();
        let now = chrono::Utc::now();
        store
            .add_task(
                "ws-1",
                Task {
                    id: "t1".into(),
                    workspace_id: "ws-1".into(),
                    assignee: "bob".into(),
                    assigned_by: "alice".into(),
                    description: "do thing".into(),
                    status: TaskStatus::Completed,
                    result: Some("ok".into()),
                    error: None,
                    timeout_seconds: 0,
                    created_at: now,
                    started_at: Some(now),
                    completed_at: Some(now),
                },
            )
            .await
            .unwrap();
        let stats = store.task_stats("ws-1").await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.completed, 1);
    }
}
