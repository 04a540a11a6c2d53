use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ruleflow_core::{EngineError, EngineResult};
use ruleflow_domain::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::ports::ExecutionObserver;

mod execution;

/// Lifecycle status of one step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not been reached.
    Pending,
    /// Step is currently executing.
    Running,
    /// Step finished successfully.
    Completed,
    /// Step reported or raised a failure.
    Failed,
    /// Step's condition evaluated false; its action never ran.
    Skipped,
}

impl StepStatus {
    /// Returns a stable storage value for the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Lifecycle status of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Execution is in flight.
    Running,
    /// Every step ran to completion or was skipped.
    Completed,
    /// A step failure or error terminated the execution.
    Failed,
    /// A cancellation request was observed at a step boundary.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns a stable storage value for the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Per-step status annotation inside one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step id copied from the definition.
    pub step_id: String,
    /// Current step status.
    pub status: StepStatus,
}

/// Ephemeral, process-local record of one workflow execution.
///
/// Created when an execution starts, mutated at step boundaries, and
/// discarded when the execution finishes. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique execution id.
    pub execution_id: Uuid,
    /// Id of the executed workflow definition.
    pub workflow_id: String,
    /// Index of the step the state machine is positioned at.
    pub current_step: usize,
    /// Execution status.
    pub status: ExecutionStatus,
    /// Execution start timestamp.
    pub started_at: DateTime<Utc>,
    /// Execution finish timestamp once terminal.
    pub finished_at: Option<DateTime<Utc>>,
    /// Definition's steps annotated with per-step status.
    pub steps: Vec<StepRecord>,
}

impl WorkflowExecution {
    /// Creates a fresh running execution with every step pending.
    #[must_use]
    pub fn start(definition: &WorkflowDefinition) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_id: definition.id().as_str().to_owned(),
            current_step: 0,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            steps: definition
                .steps()
                .iter()
                .map(|step| StepRecord {
                    step_id: step.id().as_str().to_owned(),
                    status: StepStatus::Pending,
                })
                .collect(),
        }
    }

    /// Updates one step's status.
    pub fn set_step_status(&mut self, index: usize, status: StepStatus) {
        if let Some(record) = self.steps.get_mut(index) {
            record.status = status;
        }
    }

    /// Moves the execution to a terminal status and stamps the finish time.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Registry and sequential state-machine executor for workflow definitions.
///
/// Register definitions during startup, then share the engine read-only.
/// Any number of executions may be in flight concurrently; each holds its
/// own [`WorkflowExecution`] record in the shared active-executions map for
/// exactly the duration of its `execute_workflow` call.
#[derive(Default)]
pub struct WorkflowEngine {
    workflows: Vec<Arc<WorkflowDefinition>>,
    index_by_id: HashMap<String, usize>,
    active: Mutex<HashMap<Uuid, WorkflowExecution>>,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl WorkflowEngine {
    /// Creates an engine with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer receiving every terminal execution record.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Registers a definition, replacing any prior definition with the same
    /// id in place (registration order is preserved on replacement).
    pub fn register_workflow(&mut self, definition: WorkflowDefinition) {
        let id = definition.id().as_str().to_owned();
        debug!(workflow_id = %id, "registering workflow definition");
        match self.index_by_id.get(&id) {
            Some(index) => self.workflows[*index] = Arc::new(definition),
            None => {
                self.index_by_id.insert(id, self.workflows.len());
                self.workflows.push(Arc::new(definition));
            }
        }
    }

    /// Returns one registered definition by id.
    #[must_use]
    pub fn workflow(&self, workflow_id: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.index_by_id
            .get(workflow_id)
            .map(|index| &self.workflows[*index])
    }

    /// Returns all registered definitions in registration order.
    #[must_use]
    pub fn workflows(&self) -> &[Arc<WorkflowDefinition>] {
        &self.workflows
    }

    /// Returns a snapshot of every in-flight execution.
    pub async fn active_executions(&self) -> Vec<WorkflowExecution> {
        self.active.lock().await.values().cloned().collect()
    }

    fn require_workflow(&self, workflow_id: &str) -> EngineResult<&Arc<WorkflowDefinition>> {
        self.workflow(workflow_id).ok_or_else(|| {
            EngineError::NotFound(format!("workflow '{workflow_id}' is not registered"))
        })
    }

    async fn store_snapshot(&self, execution: &WorkflowExecution) {
        if let Some(stored) = self.active.lock().await.get_mut(&execution.execution_id) {
            *stored = execution.clone();
        }
    }

    async fn notify_completed(&self, execution: &WorkflowExecution) {
        if let Some(observer) = &self.observer {
            observer.on_completed(execution).await;
        }
    }
}

#[cfg(test)]
mod tests;
