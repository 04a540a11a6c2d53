use std::collections::HashMap;
use std::sync::Arc;

use ruleflow_core::{CancellationToken, EngineResult};
use ruleflow_domain::{
    EntityRecord, Operation, ValidationContext, ValidationResult, WorkflowContext, WorkflowResult,
};
use tracing::debug;

use crate::ports::EntityTransform;
use crate::validation_engine::ValidationEngine;
use crate::workflow_engine::WorkflowEngine;

/// Input payload for one processed entity operation.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Operation being performed.
    pub operation: Operation,
    /// Entity type the operation applies to.
    pub entity_type: String,
    /// Entity payload after the operation.
    pub entity: EntityRecord,
    /// Entity payload before an update, when available.
    pub previous_entity: Option<EntityRecord>,
    /// Related records included in the validation pass, in caller order.
    pub related_entities: Vec<(String, EntityRecord)>,
    /// Acting user identifier when known.
    pub user: Option<String>,
}

impl OperationRequest {
    /// Creates a request with no related entities, prior payload, or user.
    #[must_use]
    pub fn new(operation: Operation, entity_type: impl Into<String>, entity: EntityRecord) -> Self {
        Self {
            operation,
            entity_type: entity_type.into(),
            entity,
            previous_entity: None,
            related_entities: Vec::new(),
            user: None,
        }
    }
}

/// Outcome of one processed entity operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// Whether validation allowed the operation to proceed.
    pub is_allowed: bool,
    /// Full validation result, valid or not.
    pub validation: ValidationResult,
    /// Entity produced by the registered transform, when one ran.
    pub transformed_entity: Option<EntityRecord>,
    /// Results of triggered workflows; absent when validation blocked them.
    pub workflow_results: Option<Vec<WorkflowResult>>,
}

/// Single entry point combining validation, transformation, and workflow
/// triggering for one entity operation.
///
/// Validation always runs first; workflows only run, and transforms only
/// apply, when the operation validated cleanly. Transform logic itself is
/// business-specific and injected per entity type.
pub struct OperationProcessor {
    validation: Arc<ValidationEngine>,
    workflows: Arc<WorkflowEngine>,
    transforms: HashMap<String, Arc<dyn EntityTransform>>,
}

impl OperationProcessor {
    /// Creates a processor over shared validation and workflow engines.
    #[must_use]
    pub fn new(validation: Arc<ValidationEngine>, workflows: Arc<WorkflowEngine>) -> Self {
        Self {
            validation,
            workflows,
            transforms: HashMap::new(),
        }
    }

    /// Registers the transform applied to one entity type between
    /// validation and workflow triggering, replacing any prior transform.
    pub fn register_transform(
        &mut self,
        entity_type: impl Into<String>,
        transform: Arc<dyn EntityTransform>,
    ) {
        self.transforms.insert(entity_type.into(), transform);
    }

    /// Validates and, when allowed, transforms and processes one operation.
    ///
    /// A blocked operation reports `is_allowed: false` and never reaches the
    /// transform or any workflow step. A transform failure is fatal to the
    /// call.
    pub async fn process_operation(
        &self,
        request: OperationRequest,
        cancellation: &CancellationToken,
    ) -> EngineResult<OperationOutcome> {
        let OperationRequest {
            operation,
            entity_type,
            entity,
            previous_entity,
            related_entities,
            user,
        } = request;

        let mut validation_context = ValidationContext::for_operation(operation);
        if let Some(user) = &user {
            validation_context = validation_context.with_user(user.clone());
        }

        let validation = self
            .validation
            .validate_complete(&entity_type, &entity, &related_entities, &validation_context)
            .await;
        if !validation.is_valid() {
            debug!(%entity_type, operation = operation.as_str(), "operation blocked by validation");
            return Ok(OperationOutcome {
                is_allowed: false,
                validation,
                transformed_entity: None,
                workflow_results: None,
            });
        }

        let mut workflow_context = WorkflowContext::new(entity_type.clone(), entity, operation);
        if let Some(previous_entity) = previous_entity {
            workflow_context = workflow_context.with_previous_entity(previous_entity);
        }
        if let Some(user) = user {
            workflow_context = workflow_context.with_user(user);
        }

        let transformed_entity = match self.transforms.get(&entity_type) {
            Some(transform) => {
                let transformed = transform
                    .transform(workflow_context.entity.clone(), &workflow_context)
                    .await?;
                workflow_context.entity = transformed.clone();
                Some(transformed)
            }
            None => None,
        };

        let workflow_results = self
            .workflows
            .execute_triggered_workflows(&workflow_context, cancellation)
            .await;

        Ok(OperationOutcome {
            is_allowed: true,
            validation,
            transformed_entity,
            workflow_results: Some(workflow_results),
        })
    }
}
