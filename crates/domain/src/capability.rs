use std::collections::HashMap;

use async_trait::async_trait;
use ruleflow_core::EngineResult;
use serde_json::Value;

use crate::record::EntityRecord;
use crate::validation::{Severity, ValidationContext, ValidationResult};
use crate::workflow::{WorkflowContext, WorkflowResult};

/// Rule checking a single named attribute's value in isolation.
///
/// Implementations never see their own field name; the validation engine tags
/// every produced finding with the field it was registered under.
#[async_trait]
pub trait FieldValidator: Send + Sync {
    /// Configured severity driving the engine's short-circuit rule.
    ///
    /// A validator returning [`Severity::Error`] here suppresses later
    /// validators on the same field whenever its own result is invalid.
    fn severity(&self) -> Option<Severity> {
        None
    }

    /// Validates one field value.
    async fn validate(
        &self,
        value: &Value,
        context: &ValidationContext,
    ) -> EngineResult<ValidationResult>;
}

/// Rule checking invariants across an entire record.
#[async_trait]
pub trait EntityValidator: Send + Sync {
    /// Entity type this validator is registered for.
    fn entity_type(&self) -> &str;

    /// Validates one entity record.
    async fn validate(
        &self,
        record: &EntityRecord,
        context: &ValidationContext,
    ) -> EngineResult<ValidationResult>;
}

/// Rule checking consistency among related records of different types.
#[async_trait]
pub trait CrossEntityValidator: Send + Sync {
    /// Entity types that must all be present for the rule to run.
    fn entity_types(&self) -> &[String];

    /// Validates the supplied records as a group.
    async fn validate(
        &self,
        entities: &HashMap<String, EntityRecord>,
        context: &ValidationContext,
    ) -> EngineResult<ValidationResult>;
}

/// Predicate deciding whether a workflow definition runs for an event.
pub trait WorkflowTrigger: Send + Sync {
    /// Returns whether the definition should run for this context.
    fn matches(&self, context: &WorkflowContext) -> bool;
}

impl<F> WorkflowTrigger for F
where
    F: Fn(&WorkflowContext) -> bool + Send + Sync,
{
    fn matches(&self, context: &WorkflowContext) -> bool {
        self(context)
    }
}

/// Predicate gating one workflow step.
pub trait StepCondition: Send + Sync {
    /// Returns whether the step's action should be invoked.
    fn evaluate(&self, context: &WorkflowContext) -> bool;
}

impl<F> StepCondition for F
where
    F: Fn(&WorkflowContext) -> bool + Send + Sync,
{
    fn evaluate(&self, context: &WorkflowContext) -> bool {
        self(context)
    }
}

/// One unit of potentially side-effecting workflow work.
///
/// A returned failure result is subject to the step's error policy; an `Err`
/// is always fatal to the execution.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Runs the action against the current execution context.
    async fn run(&self, context: &WorkflowContext) -> EngineResult<WorkflowResult>;
}
