use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ruleflow_core::{EngineError, EngineResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{StepAction, StepCondition, WorkflowTrigger};
use crate::record::{EntityRecord, Operation};

const MAX_STEP_ATTEMPTS: u16 = 10;
const DEFAULT_STEP_ATTEMPTS: u16 = 3;

/// Workflow-level policy applied when a step reports failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Halt the execution at the failed step.
    #[default]
    Stop,
    /// Record the failure and run the remaining steps.
    Continue,
}

impl ErrorPolicy {
    /// Returns a stable storage value for the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Continue => "continue",
        }
    }
}

/// Step-level policy overriding the workflow policy for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorPolicy {
    /// Halt the execution at this step.
    Stop,
    /// Record the failure and run the remaining steps.
    Continue,
    /// Re-invoke the action up to the step's attempt budget, then stop.
    Retry,
}

impl StepErrorPolicy {
    /// Returns a stable storage value for the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Continue => "continue",
            Self::Retry => "retry",
        }
    }
}

/// Outcome returned by one step action or one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Whether the unit of work succeeded.
    pub success: bool,
    /// Optional human-readable outcome description.
    pub message: Option<String>,
    /// Output payload; successful step data merges into context metadata.
    pub data: Map<String, Value>,
    /// Optional id of the step to jump to next (explicit branch).
    pub next_step: Option<String>,
    /// Optional failure detail.
    pub error: Option<String>,
}

impl WorkflowResult {
    /// Creates a successful result with no payload.
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            success: true,
            message: None,
            data: Map::new(),
            next_step: None,
            error: None,
        }
    }

    /// Creates a successful result carrying an output payload.
    #[must_use]
    pub fn succeeded_with_data(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: None,
            data,
            next_step: None,
            error: None,
        }
    }

    /// Creates a failed result with a description.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: Map::new(),
            next_step: None,
            error: None,
        }
    }

    /// Adds an outcome description.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Requests an explicit branch to the named step.
    #[must_use]
    pub fn with_next_step(mut self, next_step: impl Into<String>) -> Self {
        self.next_step = Some(next_step.into());
        self
    }

    /// Adds a failure detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Mutable context shared by the steps of one workflow execution.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Entity type the triggering operation applies to.
    pub entity_type: String,
    /// Entity payload after the triggering operation.
    pub entity: EntityRecord,
    /// Entity payload before an update, when available.
    pub previous_entity: Option<EntityRecord>,
    /// Acting user identifier when known.
    pub user: Option<String>,
    /// Triggering operation.
    pub operation: Operation,
    /// Step output accumulator; successful steps shallow-merge data here.
    pub metadata: Map<String, Value>,
}

impl WorkflowContext {
    /// Creates a context for one entity operation.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, entity: EntityRecord, operation: Operation) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity,
            previous_entity: None,
            user: None,
            operation,
            metadata: Map::new(),
        }
    }

    /// Adds the pre-operation entity payload.
    #[must_use]
    pub fn with_previous_entity(mut self, previous_entity: EntityRecord) -> Self {
        self.previous_entity = Some(previous_entity);
        self
    }

    /// Adds the acting user identifier.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Shallow-merges step output into the metadata accumulator.
    ///
    /// Later values replace earlier ones key by key; nested objects are
    /// replaced whole, not merged.
    pub fn merge_metadata(&mut self, data: &Map<String, Value>) {
        for (key, value) in data {
            self.metadata.insert(key.clone(), value.clone());
        }
    }

    /// Returns one metadata value when present.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// One conditional, potentially side-effecting unit within a workflow.
#[derive(Clone)]
pub struct WorkflowStep {
    id: NonEmptyString,
    name: NonEmptyString,
    condition: Option<Arc<dyn StepCondition>>,
    action: Arc<dyn StepAction>,
    next_steps: Vec<String>,
    error_handling: Option<StepErrorPolicy>,
    max_attempts: u16,
}

impl WorkflowStep {
    /// Creates a step with validated identifiers and default policy.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        action: Arc<dyn StepAction>,
    ) -> EngineResult<Self> {
        Ok(Self {
            id: NonEmptyString::new(id)?,
            name: NonEmptyString::new(name)?,
            condition: None,
            action,
            next_steps: Vec::new(),
            error_handling: None,
            max_attempts: DEFAULT_STEP_ATTEMPTS,
        })
    }

    /// Gates the step behind a condition predicate.
    #[must_use]
    pub fn with_condition(mut self, condition: Arc<dyn StepCondition>) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Declares the step ids this step may branch to.
    #[must_use]
    pub fn with_next_steps(mut self, next_steps: Vec<String>) -> Self {
        self.next_steps = next_steps;
        self
    }

    /// Overrides the workflow-level failure policy for this step.
    #[must_use]
    pub fn with_error_handling(mut self, error_handling: StepErrorPolicy) -> Self {
        self.error_handling = Some(error_handling);
        self
    }

    /// Sets the attempt budget used by the retry policy.
    pub fn with_max_attempts(mut self, max_attempts: u16) -> EngineResult<Self> {
        if max_attempts == 0 {
            return Err(EngineError::Validation(
                "max_attempts must be greater than zero".to_owned(),
            ));
        }

        if max_attempts > MAX_STEP_ATTEMPTS {
            return Err(EngineError::Validation(format!(
                "max_attempts must be less than or equal to {MAX_STEP_ATTEMPTS}"
            )));
        }

        self.max_attempts = max_attempts;
        Ok(self)
    }

    /// Returns the step id.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the step display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the optional gating condition.
    #[must_use]
    pub fn condition(&self) -> Option<&Arc<dyn StepCondition>> {
        self.condition.as_ref()
    }

    /// Returns the step action.
    #[must_use]
    pub fn action(&self) -> &Arc<dyn StepAction> {
        &self.action
    }

    /// Returns declared branch targets.
    #[must_use]
    pub fn next_steps(&self) -> &[String] {
        &self.next_steps
    }

    /// Returns the step-level policy override.
    #[must_use]
    pub fn error_handling(&self) -> Option<StepErrorPolicy> {
        self.error_handling
    }

    /// Returns the attempt budget used by the retry policy.
    #[must_use]
    pub fn max_attempts(&self) -> u16 {
        self.max_attempts
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkflowStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_condition", &self.condition.is_some())
            .field("next_steps", &self.next_steps)
            .field("error_handling", &self.error_handling)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Input payload used to construct a validated workflow definition.
#[derive(Clone)]
pub struct WorkflowDefinitionInput {
    /// Stable unique workflow id.
    pub id: String,
    /// User-facing workflow name.
    pub name: String,
    /// Entity type whose events this workflow observes.
    pub entity_type: String,
    /// Trigger predicate.
    pub trigger: Arc<dyn WorkflowTrigger>,
    /// Ordered step list.
    pub steps: Vec<WorkflowStep>,
    /// Workflow-level failure policy.
    pub error_handling: ErrorPolicy,
}

/// A named, triggerable sequence of steps bound to one entity type.
///
/// Construction builds the step transition table and rejects branch graphs
/// that could loop: every declared branch target must exist and must point
/// at a later step.
#[derive(Clone)]
pub struct WorkflowDefinition {
    id: NonEmptyString,
    name: NonEmptyString,
    entity_type: NonEmptyString,
    trigger: Arc<dyn WorkflowTrigger>,
    steps: Vec<WorkflowStep>,
    error_handling: ErrorPolicy,
    step_index_by_id: HashMap<String, usize>,
}

impl WorkflowDefinition {
    /// Creates a validated workflow definition.
    pub fn new(input: WorkflowDefinitionInput) -> EngineResult<Self> {
        let WorkflowDefinitionInput {
            id,
            name,
            entity_type,
            trigger,
            steps,
            error_handling,
        } = input;

        if steps.is_empty() {
            return Err(EngineError::Validation(
                "workflow definitions require at least one step".to_owned(),
            ));
        }

        let mut step_index_by_id = HashMap::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            if step_index_by_id
                .insert(step.id().as_str().to_owned(), index)
                .is_some()
            {
                return Err(EngineError::Validation(format!(
                    "duplicate step id '{}' in workflow definition",
                    step.id().as_str()
                )));
            }
        }

        for (index, step) in steps.iter().enumerate() {
            for target_id in step.next_steps() {
                let Some(target_index) = step_index_by_id.get(target_id) else {
                    return Err(EngineError::Validation(format!(
                        "step '{}' branches to unknown step '{}'",
                        step.id().as_str(),
                        target_id
                    )));
                };

                if *target_index <= index {
                    return Err(EngineError::Validation(format!(
                        "step '{}' branches backwards to '{}', which would allow a cycle",
                        step.id().as_str(),
                        target_id
                    )));
                }
            }
        }

        Ok(Self {
            id: NonEmptyString::new(id)?,
            name: NonEmptyString::new(name)?,
            entity_type: NonEmptyString::new(entity_type)?,
            trigger,
            steps,
            error_handling,
            step_index_by_id,
        })
    }

    /// Returns the workflow id.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the workflow display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the observed entity type.
    #[must_use]
    pub fn entity_type(&self) -> &NonEmptyString {
        &self.entity_type
    }

    /// Returns the trigger predicate.
    #[must_use]
    pub fn trigger(&self) -> &Arc<dyn WorkflowTrigger> {
        &self.trigger
    }

    /// Returns the ordered step list.
    #[must_use]
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// Returns the workflow-level failure policy.
    #[must_use]
    pub fn error_handling(&self) -> ErrorPolicy {
        self.error_handling
    }

    /// Resolves a step id through the transition table.
    #[must_use]
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.step_index_by_id.get(step_id).copied()
    }
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("steps", &self.steps)
            .field("error_handling", &self.error_handling)
            .finish_non_exhaustive()
    }
}
