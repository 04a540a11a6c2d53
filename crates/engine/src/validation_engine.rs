use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ruleflow_domain::{
    CrossEntityValidator, EntityRecord, EntityValidator, FieldValidator, Severity,
    ValidationContext, ValidationError, ValidationResult, ValidationSummary,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Synthesized code for a field validator that failed to execute.
pub const FIELD_VALIDATOR_FAILURE_CODE: &str = "VALIDATOR_ERROR";
/// Synthesized code for an entity validator that failed to execute.
pub const ENTITY_VALIDATOR_FAILURE_CODE: &str = "ENTITY_VALIDATOR_ERROR";
/// Synthesized code for a cross-entity validator that failed to execute.
pub const CROSS_ENTITY_VALIDATOR_FAILURE_CODE: &str = "CROSS_ENTITY_VALIDATOR_ERROR";

type FieldValidatorsByField = HashMap<String, Vec<Arc<dyn FieldValidator>>>;

/// Registry and executor for field, entity, and cross-entity validation.
///
/// Register validators during startup, then share the engine read-only. Each
/// pass runs validators strictly sequentially and aggregates their findings
/// in a fixed, repeatable order.
#[derive(Clone, Default)]
pub struct ValidationEngine {
    field_validators: HashMap<String, FieldValidatorsByField>,
    entity_validators: HashMap<String, Vec<Arc<dyn EntityValidator>>>,
    cross_entity_validators: Vec<Arc<dyn CrossEntityValidator>>,
}

impl ValidationEngine {
    /// Creates an engine with empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field validator under `(entity_type, field_name)`.
    ///
    /// Validators run in registration order and are not de-duplicated:
    /// registering the same validator twice runs it twice.
    pub fn register_field_validator(
        &mut self,
        entity_type: impl Into<String>,
        field_name: impl Into<String>,
        validator: Arc<dyn FieldValidator>,
    ) {
        let entity_type = entity_type.into();
        let field_name = field_name.into();
        debug!(%entity_type, %field_name, "registering field validator");
        self.field_validators
            .entry(entity_type)
            .or_default()
            .entry(field_name)
            .or_default()
            .push(validator);
    }

    /// Registers an entity validator under its own entity type.
    pub fn register_entity_validator(&mut self, validator: Arc<dyn EntityValidator>) {
        let entity_type = validator.entity_type().to_owned();
        debug!(%entity_type, "registering entity validator");
        self.entity_validators
            .entry(entity_type)
            .or_default()
            .push(validator);
    }

    /// Registers a cross-entity validator on the global list.
    pub fn register_cross_entity_validator(&mut self, validator: Arc<dyn CrossEntityValidator>) {
        debug!(
            entity_types = ?validator.entity_types(),
            "registering cross-entity validator"
        );
        self.cross_entity_validators.push(validator);
    }

    /// Runs every field validator registered for `(entity_type, field_name)`.
    ///
    /// Findings are tagged with `field_name`, so validators need not know
    /// which field they are registered under. A validator that fails to
    /// execute contributes exactly one synthesized error and never aborts
    /// the pass. An invalid result from a validator configured with error
    /// severity suppresses the remaining validators for this field; earlier
    /// findings remain.
    pub async fn validate_field(
        &self,
        entity_type: &str,
        field_name: &str,
        value: &Value,
        context: &ValidationContext,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();
        let Some(validators) = self
            .field_validators
            .get(entity_type)
            .and_then(|fields| fields.get(field_name))
        else {
            return result;
        };

        for validator in validators {
            match validator.validate(value, context).await {
                Ok(outcome) => {
                    let invalid = !outcome.is_valid();
                    result.merge(outcome.tagged_with_field(field_name));
                    if invalid && validator.severity() == Some(Severity::Error) {
                        break;
                    }
                }
                Err(error) => {
                    warn!(entity_type, field_name, %error, "field validator failed");
                    result.push_error(ValidationError::new(
                        field_name,
                        error.to_string(),
                        FIELD_VALIDATOR_FAILURE_CODE,
                        Severity::Error,
                    ));
                }
            }
        }

        result
    }

    /// Validates one record field by field, then with its entity validators.
    ///
    /// Fields run in record order; entity validators run in registration
    /// order. The union of all findings is returned.
    pub async fn validate_entity(
        &self,
        entity_type: &str,
        record: &EntityRecord,
        context: &ValidationContext,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();
        for (field_name, value) in record.fields() {
            result.merge(
                self.validate_field(entity_type, field_name, value, context)
                    .await,
            );
        }

        if let Some(validators) = self.entity_validators.get(entity_type) {
            for validator in validators {
                match validator.validate(record, context).await {
                    Ok(outcome) => result.merge(outcome),
                    Err(error) => {
                        warn!(entity_type, %error, "entity validator failed");
                        result.push_error(ValidationError::new(
                            entity_type,
                            error.to_string(),
                            ENTITY_VALIDATOR_FAILURE_CODE,
                            Severity::Error,
                        ));
                    }
                }
            }
        }

        result
    }

    /// Runs every cross-entity validator whose required types are present.
    ///
    /// A validator declaring a type absent from `entities` is skipped
    /// silently; that is an expected partial-data situation, not an error.
    pub async fn validate_cross_entity(
        &self,
        entities: &HashMap<String, EntityRecord>,
        context: &ValidationContext,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();
        for validator in &self.cross_entity_validators {
            let required = validator.entity_types();
            if !required
                .iter()
                .all(|entity_type| entities.contains_key(entity_type))
            {
                debug!(
                    entity_types = ?required,
                    "skipping cross-entity validator, required entity missing"
                );
                continue;
            }

            match validator.validate(entities, context).await {
                Ok(outcome) => result.merge(outcome),
                Err(error) => {
                    warn!(%error, "cross-entity validator failed");
                    result.push_error(ValidationError::new(
                        required.join(","),
                        error.to_string(),
                        CROSS_ENTITY_VALIDATOR_FAILURE_CODE,
                        Severity::Error,
                    ));
                }
            }
        }

        result
    }

    /// Runs the full validation pass for one operation.
    ///
    /// Findings concatenate in a fixed order: primary entity, then each
    /// related entity in the supplied order, then cross-entity checks over
    /// the union of all records. Identical inputs always produce identically
    /// ordered output.
    pub async fn validate_complete(
        &self,
        primary_type: &str,
        primary: &EntityRecord,
        related: &[(String, EntityRecord)],
        context: &ValidationContext,
    ) -> ValidationResult {
        let mut result = self.validate_entity(primary_type, primary, context).await;
        for (entity_type, record) in related {
            result.merge(self.validate_entity(entity_type, record, context).await);
        }

        let mut entities = HashMap::with_capacity(related.len() + 1);
        entities.insert(primary_type.to_owned(), primary.clone());
        for (entity_type, record) in related {
            entities.insert(entity_type.clone(), record.clone());
        }

        result.merge(self.validate_cross_entity(&entities, context).await);
        result
    }

    /// Summarizes a result's findings by severity and by code.
    #[must_use]
    pub fn validation_summary(&self, result: &ValidationResult) -> ValidationSummary {
        let error_count = result
            .errors()
            .iter()
            .filter(|error| error.severity == Severity::Error)
            .count();
        let warning_count = result.errors().len() - error_count + result.warnings().len();

        let mut counts_by_code: BTreeMap<String, usize> = BTreeMap::new();
        for error in result.errors() {
            *counts_by_code.entry(error.code.clone()).or_insert(0) += 1;
        }
        for warning in result.warnings() {
            if let Some(code) = &warning.code {
                *counts_by_code.entry(code.clone()).or_insert(0) += 1;
            }
        }

        ValidationSummary {
            is_valid: result.is_valid(),
            error_count,
            warning_count,
            counts_by_code,
        }
    }
}
