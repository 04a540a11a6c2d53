//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod capability;
mod record;
mod validation;
mod workflow;

pub use capability::{
    CrossEntityValidator, EntityValidator, FieldValidator, StepAction, StepCondition,
    WorkflowTrigger,
};
pub use record::{EntityRecord, Operation};
pub use validation::{
    Severity, ValidationContext, ValidationError, ValidationResult, ValidationSummary,
    ValidationWarning,
};
pub use workflow::{
    ErrorPolicy, StepErrorPolicy, WorkflowContext, WorkflowDefinition, WorkflowDefinitionInput,
    WorkflowResult, WorkflowStep,
};
