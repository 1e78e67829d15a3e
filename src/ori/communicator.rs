//! Inter-agent task delegation (C8).
//!
//! A thin state-machine layer over [`WorkspaceStore`]'s task map: assigns
//! tasks, drives the legal status transitions, posts the result back onto
//! the workspace as a message, and publishes the matching event-bus topic.
//! There is no separate global task index — `get_task`/`update_task_status`
//! scan each workspace's task map, which is fine at the scale this host
//! targets; an id -> workspace_id index would be the first thing to add if
//! the task population grows large enough to make that scan matter.

use crate::ori::error::{ApiError, ApiResult};
use crate::ori::event_bus::EventBus;
use crate::ori::workspace::{Message, Task, TaskStatus, WorkspaceStore};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Communicator {
    workspaces: Arc<WorkspaceStore>,
    event_bus: Arc<EventBus>,
}

impl Communicator {
    pub fn new(workspaces: Arc<WorkspaceStore>, event_bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self { workspaces, event_bus })
    }

    async fn publish(&self, topic: &str, workspace_id: &str, task: &Task) {
        let mut data = HashMap::new();
        data.insert("task_id".to_string(), serde_json::json!(task.id));
        data.insert("assignee".to_string(), serde_json::json!(task.assignee));
        self.event_bus
            .publish(topic, Some(workspace_id.to_string()), data)
            .await;
    }

    /// Create a new task in `assigned` state and publish `task.created`.
    pub async fn assign(
        &self,
        workspace_id: &str,
        id: String,
        assignee: String,
        assigned_by: String,
        description: String,
        timeout_seconds: u64,
    ) -> ApiResult<Task> {
        let task = Task {
            id: id.clone(),
            workspace_id: workspace_id.to_string(),
            assignee,
            assigned_by,
            description,
            status: TaskStatus::Assigned,
            result: None,
            error: None,
            timeout_seconds,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.workspaces.add_task(workspace_id, task.clone()).await?;
        self.publish("task.created", workspace_id, &task).await;
        Ok(task)
    }

    /// `assigned -> in_progress`.
    pub async fn start(&self, workspace_id: &str, task_id: &str) -> ApiResult<Task> {
        let task = self
            .workspaces
            .update_task(workspace_id, task_id, |t| {
                if t.status == TaskStatus::Assigned {
                    t.status = TaskStatus::InProgress;
                    t.started_at = Some(chrono::Utc::now());
                }
            })
            .await?;
        if task.status != TaskStatus::InProgress {
            return Err(ApiError::conflict(format!(
                "task '{task_id}' cannot start from its current status"
            )));
        }
        Ok(task)
    }

    async fn post_result_message(&self, workspace_id: &str, task: &Task) -> ApiResult<()> {
        let content = match (&task.result, &task.error) {
            (_, Some(error)) => format!("Task '{}' failed: {error}", task.id),
            (Some(result), None) => format!("Task '{}' completed: {result}", task.id),
            (None, None) => format!("Task '{}' completed", task.id),
        };
        self.workspaces
            .add_message(
                workspace_id,
                Message {
                    id: format!("{}-result", task.id),
                    from_agent: task.assignee.clone(),
                    to_agent: Some(task.assigned_by.clone()),
                    content,
                    created_at: chrono::Utc::now(),
                },
            )
            .await
    }

    /// `in_progress -> completed`, posting the result back to the assigner.
    pub async fn complete(&self, workspace_id: &str, task_id: &str, result: String) -> ApiResult<Task> {
        let task = self
            .workspaces
            .update_task(workspace_id, task_id, |t| {
                if t.status == TaskStatus::InProgress {
                    t.status = TaskStatus::Completed;
                    t.result = Some(result);
                    t.completed_at = Some(chrono::Utc::now());
                }
            })
            .await?;
        if task.status != TaskStatus::Completed {
            return Err(ApiError::conflict(format!(
                "task '{task_id}' cannot complete from its current status"
            )));
        }
        self.post_result_message(workspace_id, &task).await?;
        self.publish("task.completed", workspace_id, &task).await;
        Ok(task)
    }

    /// `in_progress -> failed`, posting the error back to the assigner.
    pub async fn fail(&self, workspace_id: &str, task_id: &str, error: String) -> ApiResult<Task> {
        let task = self
            .workspaces
            .update_task(workspace_id, task_id, |t| {
                if t.status == TaskStatus::InProgress {
                    t.status = TaskStatus::Failed;
                    t.error = Some(error);
                    t.completed_at = Some(chrono::Utc::now());
                }
            })
            .await?;
        if task.status != TaskStatus::Failed {
            return Err(ApiError::conflict(format!(
                "task '{task_id}' cannot fail from its current status"
            )));
        }
        self.post_result_message(workspace_id, &task).await?;
        self.publish("task.failed", workspace_id, &task).await;
        Ok(task)
    }

    /// `assigned|in_progress -> cancelled`.
    pub async fn cancel(&self, workspace_id: &str, task_id: &str) -> ApiResult<Task> {
        let task = self
            .workspaces
            .update_task(workspace_id, task_id, |t| {
                if matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                    t.status = TaskStatus::Cancelled;
                    t.completed_at = Some(chrono::Utc::now());
                }
            })
            .await?;
        if task.status != TaskStatus::Cancelled {
            return Err(ApiError::conflict(format!(
                "task '{task_id}' cannot be cancelled from its current status"
            )));
        }
        Ok(task)
    }

    /// Look up a single task by workspace + id, scanning that workspace's
    /// task map (see the module-level note on why there's no global index).
    pub async fn get_task_via_workspace(&self, workspace_id: &str, task_id: &str) -> ApiResult<Task> {
        self.workspaces.get_task(workspace_id, task_id).await
    }

    /// Sweep every in-progress task in `workspace_id` whose `timeout_seconds`
    /// is non-zero and has elapsed since `started_at`, transitioning it to
    /// `timeout` and publishing `task.timeout`.
    pub async fn sweep_timeouts(&self, workspace_id: &str) -> ApiResult<Vec<Task>> {
        let data = self.workspaces.get(workspace_id).await?;
        let now = chrono::Utc::now();
        let mut timed_out = Vec::new();
        for task in data.tasks.values() {
            if task.status != TaskStatus::InProgress || task.timeout_seconds == 0 {
                continue;
            }
            let Some(started_at) = task.started_at else { continue };
            let elapsed = (now - started_at).num_seconds().max(0) as u64;
            if elapsed > task.timeout_seconds {
                let updated = self
                    .workspaces
                    .update_task(workspace_id, &task.id, |t| {
                        if t.status == TaskStatus::InProgress {
                            t.status = TaskStatus::Timeout;
                            t.completed_at = Some(now);
                        }
                    })
                    .await?;
                self.publish("task.timeout", workspace_id, &updated).await;
                timed_out.push(updated);
            }
        }
        Ok(timed_out)
    }

    /// Remove terminal tasks whose `completed_at` is older than `older_than`.
    /// Intended to be run on a caller-driven cadence, not a built-in timer.
    pub async fn cleanup_terminal(
        &self,
        workspace_id: &str,
        older_than: chrono::Duration,
    ) -> ApiResult<usize> {
        let data = self.workspaces.get(workspace_id).await?;
        let now = chrono::Utc::now();
        let stale: Vec<String> = data
            .tasks
            .values()
            .filter(|t| {
                matches!(
                    t.status,
                    TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
                ) && t.completed_at.map(|c| now - c > older_than).unwrap_or(false)
            })
            .map(|t| t.id.clone())
            .collect();
        let removed = stale.len();
        for id in stale {
            self.workspaces.remove_task(workspace_id, &id).await.ok();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Arc<WorkspaceStore>, Arc<Communicator>) {
        let dir = tempfile::tempdir().unwrap();
        let workspaces = WorkspaceStore::new(dir.path());
        workspaces.create("ws-1", "planning", None).await.unwrap();
        workspaces.add_agent("ws-1", "alice").await.unwrap();
        workspaces.add_agent("ws-1", "bob").await.unwrap();
        let bus = EventBus::new();
        let communicator = Communicator::new(Arc::clone(&workspaces), bus);
        (workspaces, communicator)
    }

    #[tokio::test]
    async fn full_success_lifecycle() {
        let (_ws, comm) = setup().await;
        comm.assign("ws-1", "t1".into(), "bob".into(), "alice".into(), "sum numbers".into(), 0)
            .await
            .unwrap();
        comm.start("ws-1", "t1").await.unwrap();
        let task = comm.complete("ws-1", "t1", "42".into()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn cannot_complete_a_task_that_never_started() {
        let (_ws, comm) = setup().await;
        comm.assign("ws-1", "t1".into(), "bob".into(), "alice".into(), "sum numbers".into(), 0)
            .await
            .unwrap();
        let err = comm.complete("ws-1", "t1", "42".into()).await.unwrap_err();
        assert_eq!(err.code, crate::ori::error::ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn sweep_times_out_stale_in_progress_task() {
        let (ws, comm) = setup().await;
        comm.assign("ws-1", "t1".into(), "bob".into(), "alice".into(), "sum numbers".into(), 1)
            .await
            .unwrap();
        comm.start("ws-1", "t1").await.unwrap();
        ws.update_task("ws-1", "t1", |t| {
            t.started_at = Some(chrono::Utc::now() - chrono::Duration::seconds(10));
        })
        .await
        .unwrap();
        let timed_out = comm.sweep_timeouts("ws-1").await.unwrap();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].status, TaskStatus::Timeout);
    }
}
