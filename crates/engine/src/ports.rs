use async_trait::async_trait;
use ruleflow_core::EngineResult;
use ruleflow_domain::{EntityRecord, WorkflowContext};

use crate::workflow_engine::WorkflowExecution;

/// Observer notified when one workflow execution reaches a terminal status.
///
/// Executions are never persisted; this hook is the only way to inspect the
/// final per-step statuses after the engine discards the record.
#[async_trait]
pub trait ExecutionObserver: Send + Sync {
    /// Receives the final execution record before it is discarded.
    async fn on_completed(&self, execution: &WorkflowExecution);
}

/// Business-supplied entity transformation applied between validation and
/// workflow triggering.
#[async_trait]
pub trait EntityTransform: Send + Sync {
    /// Returns the entity to hand to triggered workflows.
    async fn transform(
        &self,
        entity: EntityRecord,
        context: &WorkflowContext,
    ) -> EngineResult<EntityRecord>;
}
