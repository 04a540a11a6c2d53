//! Validation and workflow orchestration engines.

#![forbid(unsafe_code)]

mod ports;
mod processor;
mod validation_engine;
mod workflow_engine;

pub use ports::{EntityTransform, ExecutionObserver};
pub use processor::{OperationOutcome, OperationProcessor, OperationRequest};
pub use validation_engine::{
    CROSS_ENTITY_VALIDATOR_FAILURE_CODE, ENTITY_VALIDATOR_FAILURE_CODE,
    FIELD_VALIDATOR_FAILURE_CODE, ValidationEngine,
};
pub use workflow_engine::{
    ExecutionStatus, StepRecord, StepStatus, WorkflowEngine, WorkflowExecution,
};
