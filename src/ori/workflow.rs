//! Workflow engine (C9).
//!
//! A workflow is a DAG of steps. Each tick advances every step whose
//! `depends_on` set is satisfied: `task` steps are dispatched to the
//! [`Communicator`] as real tasks, while `aggregate`/`condition`/`parallel`/
//! `sequential` steps are evaluated synchronously in-process (no agent
//! round-trip). Workflow-level status is always derived from step statuses,
//! never stored independently — matching the note in the design guidance
//! that tagged state should be computed, not duplicated.

use crate::ori::communicator::Communicator;
use crate::ori::error::{ApiError, ApiResult};
use crate::ori::event_bus::EventBus;
use crate::ori::workspace::TaskStatus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Task,
    Aggregate,
    Condition,
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Contains,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl StepCondition {
    fn evaluate(&self, context: &HashMap<String, serde_json::Value>) -> bool {
        let actual = context.get(&self.field);
        match self.operator {
            ConditionOperator::Exists => actual.is_some(),
            ConditionOperator::Eq => actual == self.value.as_ref(),
            ConditionOperator::Ne => actual != self.value.as_ref(),
            ConditionOperator::Contains => match (actual, &self.value) {
                (Some(serde_json::Value::String(haystack)), Some(serde_json::Value::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (Some(serde_json::Value::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Waiting,
    Ready,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

fn is_terminal(status: StepStatus) -> bool {
    matches!(
        status,
        StepStatus::Completed | StepStatus::Failed | StepStatus::Cancelled | StepStatus::Skipped
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub step_type: StepType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub condition: Option<StepCondition>,
    /// Whether an unmet `depends_on` set should skip this step (rather than
    /// leaving it pending forever) once every dependency is terminal.
    #[serde(default)]
    pub skip_if_dependency_not_completed: bool,
    pub status: StepStatus,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Workflow {
    fn step_status(&self, id: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.id == id).map(|s| s.status)
    }

    /// Transition every `pending`/`waiting` step into `ready` if its
    /// dependencies are now satisfied, or into `waiting` otherwise, and
    /// return the ids that just became `ready` (dependencies that were
    /// skipped still count as satisfied for a step that opts in via
    /// `skip_if_dependency_not_completed`). Steps are dispatched only after
    /// passing through `ready`, never directly from `pending`.
    fn ready_step_ids(&mut self) -> Vec<String> {
        let statuses: HashMap<String, StepStatus> =
            self.steps.iter().map(|s| (s.id.clone(), s.status)).collect();
        let mut ready = Vec::new();
        for step in &mut self.steps {
            if !matches!(step.status, StepStatus::Pending | StepStatus::Waiting) {
                continue;
            }
            let satisfied = step.depends_on.iter().all(|dep_id| match statuses.get(dep_id.as_str()) {
                Some(StepStatus::Completed) => true,
                Some(StepStatus::Skipped) => step.skip_if_dependency_not_completed,
                _ => false,
            });
            step.status = if satisfied { StepStatus::Ready } else { StepStatus::Waiting };
            if satisfied {
                ready.push(step.id.clone());
            }
        }
        ready
    }

    /// Derive the workflow-level status from step statuses: `in_progress`
    /// while anything is non-terminal, `completed` if every step terminated
    /// without failure, otherwise `failed`.
    pub fn derived_status(&self) -> WorkflowStatus {
        if self.steps.iter().any(|s| !is_terminal(s.status)) {
            return WorkflowStatus::InProgress;
        }
        if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        }
    }
}

/// Reject a step graph containing a dependency cycle, via plain DFS.
pub fn validate_acyclic(steps: &[WorkflowStep]) -> ApiResult<()> {
    let by_id: HashMap<&str, &WorkflowStep> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a WorkflowStep>,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> ApiResult<()> {
        if stack.contains(id) {
            return Err(ApiError::validation(format!("workflow step cycle detected at '{id}'")));
        }
        if visited.contains(id) {
            return Ok(());
        }
        visited.insert(id);
        stack.insert(id);
        if let Some(step) = by_id.get(id) {
            for dep in &step.depends_on {
                visit(dep.as_str(), by_id, visited, stack)?;
            }
        }
        stack.remove(id);
        Ok(())
    }

    for step in steps {
        visit(step.id.as_str(), &by_id, &mut visited, &mut stack)?;
    }
    Ok(())
}

/// Owns every in-memory [`Workflow`] and drives step dispatch. A real
/// deployment would back this with the same workspace-file persistence as
/// [`WorkspaceStore`]; kept in-memory here since workflow runs are expected
/// to be short-lived relative to a workspace's lifetime.
pub struct WorkflowEngine {
    workflows: RwLock<HashMap<String, Workflow>>,
    communicator: Arc<Communicator>,
    event_bus: Arc<EventBus>,
}

impl WorkflowEngine {
    pub fn new(communicator: Arc<Communicator>, event_bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            workflows: RwLock::new(HashMap::new()),
            communicator,
            event_bus,
        })
    }

    pub async fn create(&self, workflow: Workflow) -> ApiResult<Workflow> {
        validate_acyclic(&workflow.steps)?;
        let mut data = HashMap::new();
        data.insert("workflow_id".to_string(), serde_json::json!(workflow.id));
        self.event_bus
            .publish("workflow.started", Some(workflow.workspace_id.clone()), data)
            .await;
        self.workflows.write().await.insert(workflow.id.clone(), workflow.clone());
        Ok(workflow)
    }

    pub async fn get(&self, id: &str) -> ApiResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("workflow '{id}' not found")))
    }

    async fn publish_step(&self, topic: &str, workspace_id: &str, step_id: &str) {
        let mut data = HashMap::new();
        data.insert("step_id".to_string(), serde_json::json!(step_id));
        self.event_bus.publish(topic, Some(workspace_id.to_string()), data).await;
    }

    /// Dispatch every currently-ready step once. `task` steps become real
    /// tasks via the communicator; other step types are evaluated inline.
    /// Call repeatedly (e.g. each time a task completes) to drive the
    /// workflow to completion.
    pub async fn tick(&self, id: &str) -> ApiResult<WorkflowStatus> {
        let ready_ids = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(id)
                .ok_or_else(|| ApiError::not_found(format!("workflow '{id}' not found")))?;
            workflow.ready_step_ids()
        };

        for step_id in ready_ids {
            self.dispatch_step(id, &step_id).await?;
        }

        // Pull in any task outcomes that have landed since the last tick.
        self.sync_task_backed_steps(id).await?;

        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("workflow '{id}' not found")))?;
        let status = workflow.derived_status();
        Ok(status)
    }

    async fn dispatch_step(&self, workflow_id: &str, step_id: &str) -> ApiResult<()> {
        let (workspace_id, step_type, condition, assigned_to, description, context) = {
            let workflows = self.workflows.read().await;
            let workflow = workflows.get(workflow_id).unwrap();
            let step = workflow.steps.iter().find(|s| s.id == step_id).unwrap();
            (
                workflow.workspace_id.clone(),
                step.step_type,
                step.condition.clone(),
                step.assigned_to.clone(),
                step.description.clone(),
                workflow.context.clone(),
            )
        };

        self.publish_step("step.started", &workspace_id, step_id).await;

        match step_type {
            StepType::Task => {
                let assignee = assigned_to
                    .ok_or_else(|| ApiError::validation(format!("step '{step_id}' has no assignee")))?;
                let task = self
                    .communicator
                    .assign(
                        &workspace_id,
                        format!("{workflow_id}-{step_id}"),
                        assignee,
                        "workflow-engine".to_string(),
                        description,
                        0,
                    )
                    .await?;
                let mut workflows = self.workflows.write().await;
                let workflow = workflows.get_mut(workflow_id).unwrap();
                let step = workflow.steps.iter_mut().find(|s| s.id == step_id).unwrap();
                step.status = StepStatus::InProgress;
                step.task_id = Some(task.id);
            }
            StepType::Condition => {
                let outcome = condition
                    .map(|c| c.evaluate(&context))
                    .unwrap_or(true);
                let mut workflows = self.workflows.write().await;
                let workflow = workflows.get_mut(workflow_id).unwrap();
                let step = workflow.steps.iter_mut().find(|s| s.id == step_id).unwrap();
                step.status = if outcome { StepStatus::Completed } else { StepStatus::Skipped };
                drop(workflows);
                self.publish_step(
                    if outcome { "step.completed" } else { "step.failed" },
                    &workspace_id,
                    step_id,
                )
                .await;
            }
            StepType::Aggregate | StepType::Parallel | StepType::Sequential => {
                // These types have no independent execution semantics of
                // their own here: they complete as soon as every dependency
                // they list has already been satisfied (checked by
                // `ready_step_ids` before `dispatch_step` is ever called).
                let mut workflows = self.workflows.write().await;
                let workflow = workflows.get_mut(workflow_id).unwrap();
                let step = workflow.steps.iter_mut().find(|s| s.id == step_id).unwrap();
                step.status = StepStatus::Completed;
                drop(workflows);
                self.publish_step("step.completed", &workspace_id, step_id).await;
            }
        }
        Ok(())
    }

    /// Reconcile in-progress task-backed steps against the communicator's
    /// current task status.
    async fn sync_task_backed_steps(&self, workflow_id: &str) -> ApiResult<()> {
        let in_progress: Vec<(String, String, String)> = {
            let workflows = self.workflows.read().await;
            let workflow = workflows.get(workflow_id).unwrap();
            workflow
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::InProgress && s.task_id.is_some())
                .map(|s| (s.id.clone(), s.task_id.clone().unwrap(), workflow.workspace_id.clone()))
                .collect()
        };

        for (step_id, task_id, workspace_id) in in_progress {
            let task = match self.communicator_task(&workspace_id, &task_id).await {
                Ok(task) => task,
                Err(_) => continue,
            };
            let new_status = match task.status {
                TaskStatus::Completed => Some(StepStatus::Completed),
                TaskStatus::Failed | TaskStatus::Timeout => Some(StepStatus::Failed),
                TaskStatus::Cancelled => Some(StepStatus::Cancelled),
                _ => None,
            };
            if let Some(new_status) = new_status {
                let mut workflows = self.workflows.write().await;
                let workflow = workflows.get_mut(workflow_id).unwrap();
                let step = workflow.steps.iter_mut().find(|s| s.id == step_id).unwrap();
                step.status = new_status;
                drop(workflows);
                let topic = if new_status == StepStatus::Completed {
                    "step.completed"
                } else {
                    "step.failed"
                };
                self.publish_step(topic, &workspace_id, &step_id).await;
            }
        }
        Ok(())
    }

    async fn communicator_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> ApiResult<crate::ori::workspace::Task> {
        self.communicator
            .get_task_via_workspace(workspace_id, task_id)
            .await
    }

    /// Mark every non-terminal step cancelled.
    pub async fn cancel(&self, id: &str) -> ApiResult<()> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("workflow '{id}' not found")))?;
        for step in workflow.steps.iter_mut() {
            if !is_terminal(step.status) {
                step.status = StepStatus::Cancelled;
            }
        }
        let workspace_id = workflow.workspace_id.clone();
        drop(workflows);
        let mut data = HashMap::new();
        data.insert("workflow_id".to_string(), serde_json::json!(id));
        self.event_bus.publish("workflow.failed", Some(workspace_id), data).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, step_type: StepType, depends_on: &[&str]) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            step_type,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            assigned_to: if step_type == StepType::Task { Some("bob".to_string()) } else { None },
            description: "do work".to_string(),
            condition: None,
            skip_if_dependency_not_completed: false,
            status: StepStatus::Pending,
            task_id: None,
        }
    }

    #[test]
    fn cycle_detection_rejects_self_referential_steps() {
        let steps = vec![step("a", StepType::Task, &["b"]), step("b", StepType::Task, &["a"])];
        assert!(validate_acyclic(&steps).is_err());
    }

    #[test]
    fn acyclic_graph_passes_validation() {
        let steps = vec![step("a", StepType::Task, &[]), step("b", StepType::Task, &["a"])];
        assert!(validate_acyclic(&steps).is_ok());
    }

    #[test]
    fn ready_steps_require_all_dependencies_completed() {
        let mut workflow = Workflow {
            id: "wf1".into(),
            workspace_id: "ws-1".into(),
            name: "demo".into(),
            steps: vec![step("a", StepType::Task, &[]), step("b", StepType::Task, &["a"])],
            context: HashMap::new(),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(workflow.ready_step_ids(), vec!["a".to_string()]);
        workflow.steps[0].status = StepStatus::Completed;
        assert_eq!(workflow.ready_step_ids(), vec!["b".to_string()]);
    }

    #[test]
    fn derived_status_is_failed_when_any_step_failed() {
        let mut workflow = Workflow {
            id: "wf1".into(),
            workspace_id: "ws-1".into(),
            name: "demo".into(),
            steps: vec![step("a", StepType::Task, &[])],
            context: HashMap::new(),
            created_at: chrono::Utc::now(),
        };
        workflow.steps[0].status = StepStatus::Failed;
        assert_eq!(workflow.derived_status(), WorkflowStatus::Failed);
    }
}
