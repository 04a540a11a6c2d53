use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use ruleflow_core::{CancellationToken, EngineError, EngineResult};
use ruleflow_domain::{
    EntityRecord, ErrorPolicy, Operation, StepAction, StepErrorPolicy, WorkflowContext,
    WorkflowDefinition, WorkflowDefinitionInput, WorkflowResult, WorkflowStep,
};

use super::{ExecutionStatus, StepStatus, WorkflowEngine, WorkflowExecution};
use crate::ports::ExecutionObserver;

type CallLog = Arc<Mutex<Vec<&'static str>>>;

struct ScriptedAction {
    label: &'static str,
    result: WorkflowResult,
    calls: CallLog,
}

#[async_trait]
impl StepAction for ScriptedAction {
    async fn run(&self, _context: &WorkflowContext) -> EngineResult<WorkflowResult> {
        self.calls.lock().await.push(self.label);
        Ok(self.result.clone())
    }
}

struct ErroringAction;

#[async_trait]
impl StepAction for ErroringAction {
    async fn run(&self, _context: &WorkflowContext) -> EngineResult<WorkflowResult> {
        Err(EngineError::Internal("step action exploded".to_owned()))
    }
}

struct FlakyAction {
    label: &'static str,
    failures_remaining: Mutex<u32>,
    calls: CallLog,
}

#[async_trait]
impl StepAction for FlakyAction {
    async fn run(&self, _context: &WorkflowContext) -> EngineResult<WorkflowResult> {
        self.calls.lock().await.push(self.label);
        let mut failures_remaining = self.failures_remaining.lock().await;
        if *failures_remaining > 0 {
            *failures_remaining -= 1;
            return Ok(WorkflowResult::failed("simulated transient failure"));
        }

        Ok(WorkflowResult::succeeded())
    }
}

struct FailThenErrorAction {
    calls: CallLog,
}

#[async_trait]
impl StepAction for FailThenErrorAction {
    async fn run(&self, _context: &WorkflowContext) -> EngineResult<WorkflowResult> {
        let mut calls = self.calls.lock().await;
        calls.push("attempt");
        if calls.len() == 1 {
            return Ok(WorkflowResult::failed("first attempt failed"));
        }

        Err(EngineError::Internal("second attempt exploded".to_owned()))
    }
}

struct CancellingAction {
    token: CancellationToken,
}

#[async_trait]
impl StepAction for CancellingAction {
    async fn run(&self, _context: &WorkflowContext) -> EngineResult<WorkflowResult> {
        self.token.cancel();
        Ok(WorkflowResult::succeeded())
    }
}

#[derive(Default)]
struct RecordingObserver {
    executions: Mutex<Vec<WorkflowExecution>>,
}

#[async_trait]
impl ExecutionObserver for RecordingObserver {
    async fn on_completed(&self, execution: &WorkflowExecution) {
        self.executions.lock().await.push(execution.clone());
    }
}

fn context() -> WorkflowContext {
    WorkflowContext::new("order", EntityRecord::empty(), Operation::Create)
}

fn step(id: &str, action: Arc<dyn StepAction>) -> WorkflowStep {
    WorkflowStep::new(id, id.to_uppercase(), action).unwrap_or_else(|_| unreachable!())
}

fn scripted(id: &'static str, result: WorkflowResult, calls: &CallLog) -> WorkflowStep {
    step(
        id,
        Arc::new(ScriptedAction {
            label: id,
            result,
            calls: calls.clone(),
        }),
    )
}

fn definition(
    id: &str,
    steps: Vec<WorkflowStep>,
    error_handling: ErrorPolicy,
) -> WorkflowDefinition {
    WorkflowDefinition::new(WorkflowDefinitionInput {
        id: id.to_owned(),
        name: "Order Followup".to_owned(),
        entity_type: "order".to_owned(),
        trigger: Arc::new(|context: &WorkflowContext| context.operation == Operation::Create),
        steps,
        error_handling,
    })
    .unwrap_or_else(|_| unreachable!())
}

fn data_with(key: &str, value: Value) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(key.to_owned(), value);
    data
}

fn step_statuses(execution: &WorkflowExecution) -> Vec<StepStatus> {
    execution.steps.iter().map(|record| record.status).collect()
}

#[tokio::test]
async fn two_step_workflow_completes_with_metadata_condition() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted(
                "collect",
                WorkflowResult::succeeded_with_data(data_with("x", json!(1))),
                &calls,
            ),
            scripted("notify", WorkflowResult::succeeded(), &calls).with_condition(Arc::new(
                |context: &WorkflowContext| context.metadata_value("x") == Some(&json!(1)),
            )),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    let result = result.unwrap_or_else(|_| unreachable!());
    assert!(result.success);
    assert_eq!(result.data.get("x"), Some(&json!(1)));

    let executions = observer.executions.lock().await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(
        step_statuses(&executions[0]),
        vec![StepStatus::Completed, StepStatus::Completed]
    );
}

#[tokio::test]
async fn false_condition_skips_step_without_invoking_action() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted("collect", WorkflowResult::succeeded(), &calls),
            scripted("escalate", WorkflowResult::succeeded(), &calls)
                .with_condition(Arc::new(|_: &WorkflowContext| false)),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert_eq!(*calls.lock().await, vec!["collect", "notify"]);

    let executions = observer.executions.lock().await;
    assert_eq!(
        step_statuses(&executions[0]),
        vec![
            StepStatus::Completed,
            StepStatus::Skipped,
            StepStatus::Completed
        ]
    );
}

#[tokio::test]
async fn returned_failure_halts_under_default_stop_policy() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted("collect", WorkflowResult::succeeded(), &calls),
            scripted("verify", WorkflowResult::failed("stock missing"), &calls),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    let result = result.unwrap_or_else(|_| unreachable!());
    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some("stock missing"));
    assert_eq!(*calls.lock().await, vec!["collect", "verify"]);

    let executions = observer.executions.lock().await;
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert_eq!(
        step_statuses(&executions[0]),
        vec![
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Pending
        ]
    );
}

#[tokio::test]
async fn workflow_level_continue_runs_remaining_steps() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted("verify", WorkflowResult::failed("stock missing"), &calls),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Continue,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(result.unwrap_or_else(|_| unreachable!()).success);
    assert_eq!(*calls.lock().await, vec!["verify", "notify"]);

    let executions = observer.executions.lock().await;
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(
        step_statuses(&executions[0]),
        vec![StepStatus::Failed, StepStatus::Completed]
    );
}

#[tokio::test]
async fn step_level_continue_overrides_stop_default() {
    let calls: CallLog = Arc::default();
    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted("verify", WorkflowResult::failed("stock missing"), &calls)
                .with_error_handling(StepErrorPolicy::Continue),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(result.unwrap_or_else(|_| unreachable!()).success);
    assert_eq!(*calls.lock().await, vec!["verify", "notify"]);
}

#[tokio::test]
async fn erroring_action_halts_even_under_continue_policy() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            step("verify", Arc::new(ErroringAction)),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Continue,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    let result = result.unwrap_or_else(|_| unreachable!());
    assert!(!result.success);
    assert!(result.error.is_some());
    assert!(calls.lock().await.is_empty());

    let executions = observer.executions.lock().await;
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert_eq!(
        step_statuses(&executions[0]),
        vec![StepStatus::Failed, StepStatus::Pending]
    );
}

#[tokio::test]
async fn retry_policy_retries_returned_failures() {
    let calls: CallLog = Arc::default();
    let flaky = WorkflowStep::new(
        "verify",
        "Verify",
        Arc::new(FlakyAction {
            label: "verify",
            failures_remaining: Mutex::new(2),
            calls: calls.clone(),
        }),
    )
    .unwrap_or_else(|_| unreachable!())
    .with_error_handling(StepErrorPolicy::Retry)
    .with_max_attempts(3)
    .unwrap_or_else(|_| unreachable!());

    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition("order_followup", vec![flaky], ErrorPolicy::Stop));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(result.unwrap_or_else(|_| unreachable!()).success);
    assert_eq!(calls.lock().await.len(), 3);
}

#[tokio::test]
async fn exhausted_retry_budget_follows_stop_semantics() {
    let calls: CallLog = Arc::default();
    let flaky = WorkflowStep::new(
        "verify",
        "Verify",
        Arc::new(FlakyAction {
            label: "verify",
            failures_remaining: Mutex::new(5),
            calls: calls.clone(),
        }),
    )
    .unwrap_or_else(|_| unreachable!())
    .with_error_handling(StepErrorPolicy::Retry)
    .with_max_attempts(2)
    .unwrap_or_else(|_| unreachable!());

    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition("order_followup", vec![flaky], ErrorPolicy::Stop));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(!result.unwrap_or_else(|_| unreachable!()).success);
    assert_eq!(calls.lock().await.len(), 2);
}

#[tokio::test]
async fn error_during_retry_is_immediately_fatal() {
    let calls: CallLog = Arc::default();
    let flaky = WorkflowStep::new(
        "verify",
        "Verify",
        Arc::new(FailThenErrorAction {
            calls: calls.clone(),
        }),
    )
    .unwrap_or_else(|_| unreachable!())
    .with_error_handling(StepErrorPolicy::Retry)
    .with_max_attempts(5)
    .unwrap_or_else(|_| unreachable!());

    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition("order_followup", vec![flaky], ErrorPolicy::Stop));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    let result = result.unwrap_or_else(|_| unreachable!());
    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(calls.lock().await.len(), 2);
}

#[tokio::test]
async fn next_step_branch_jumps_over_intermediate_steps() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted(
                "collect",
                WorkflowResult::succeeded().with_next_step("notify"),
                &calls,
            )
            .with_next_steps(vec!["notify".to_owned()]),
            scripted("escalate", WorkflowResult::succeeded(), &calls),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(result.unwrap_or_else(|_| unreachable!()).success);
    assert_eq!(*calls.lock().await, vec!["collect", "notify"]);

    let executions = observer.executions.lock().await;
    assert_eq!(
        step_statuses(&executions[0]),
        vec![
            StepStatus::Completed,
            StepStatus::Pending,
            StepStatus::Completed
        ]
    );
}

#[tokio::test]
async fn unknown_next_step_advances_sequentially() {
    let calls: CallLog = Arc::default();
    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted(
                "collect",
                WorkflowResult::succeeded().with_next_step("nonexistent"),
                &calls,
            ),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert_eq!(*calls.lock().await, vec!["collect", "notify"]);
}

#[tokio::test]
async fn backward_branch_request_is_refused() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            scripted("collect", WorkflowResult::succeeded(), &calls),
            scripted(
                "verify",
                WorkflowResult::succeeded().with_next_step("collect"),
                &calls,
            ),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(!result.unwrap_or_else(|_| unreachable!()).success);
    assert_eq!(*calls.lock().await, vec!["collect", "verify"]);

    let executions = observer.executions.lock().await;
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn unknown_workflow_id_is_fatal() {
    let engine = WorkflowEngine::new();
    let result = engine
        .execute_workflow("missing", context(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn triggered_workflows_run_independently() {
    let calls: CallLog = Arc::default();
    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition(
        "erroring",
        vec![step("verify", Arc::new(ErroringAction))],
        ErrorPolicy::Stop,
    ));
    engine.register_workflow(definition(
        "healthy",
        vec![scripted("notify", WorkflowResult::succeeded(), &calls)],
        ErrorPolicy::Stop,
    ));
    engine.register_workflow(WorkflowDefinition::new(WorkflowDefinitionInput {
        id: "other_entity".to_owned(),
        name: "Other Entity".to_owned(),
        entity_type: "invoice".to_owned(),
        trigger: Arc::new(|_: &WorkflowContext| true),
        steps: vec![scripted("never", WorkflowResult::succeeded(), &calls)],
        error_handling: ErrorPolicy::Stop,
    })
    .unwrap_or_else(|_| unreachable!()));
    engine.register_workflow(WorkflowDefinition::new(WorkflowDefinitionInput {
        id: "unmatched_trigger".to_owned(),
        name: "Unmatched Trigger".to_owned(),
        entity_type: "order".to_owned(),
        trigger: Arc::new(|context: &WorkflowContext| context.operation == Operation::Delete),
        steps: vec![scripted("never2", WorkflowResult::succeeded(), &calls)],
        error_handling: ErrorPolicy::Stop,
    })
    .unwrap_or_else(|_| unreachable!()));

    let results = engine
        .execute_triggered_workflows(&context(), &CancellationToken::new())
        .await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[1].success);
    assert_eq!(*calls.lock().await, vec!["notify"]);
}

#[tokio::test]
async fn cancellation_is_observed_at_step_boundaries() {
    let calls: CallLog = Arc::default();
    let observer = Arc::new(RecordingObserver::default());
    let token = CancellationToken::new();
    let mut engine = WorkflowEngine::new().with_observer(observer.clone());
    engine.register_workflow(definition(
        "order_followup",
        vec![
            step(
                "collect",
                Arc::new(CancellingAction {
                    token: token.clone(),
                }),
            ),
            scripted("notify", WorkflowResult::succeeded(), &calls),
        ],
        ErrorPolicy::Stop,
    ));

    let result = engine.execute_workflow("order_followup", context(), &token).await;

    assert!(result.is_ok());
    assert!(!result.unwrap_or_else(|_| unreachable!()).success);
    assert!(calls.lock().await.is_empty());

    let executions = observer.executions.lock().await;
    assert_eq!(executions[0].status, ExecutionStatus::Cancelled);
    assert_eq!(
        step_statuses(&executions[0]),
        vec![StepStatus::Completed, StepStatus::Pending]
    );
    assert!(engine.active_executions().await.is_empty());
}

#[tokio::test]
async fn active_executions_are_drained_on_failure() {
    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition(
        "order_followup",
        vec![step("verify", Arc::new(ErroringAction))],
        ErrorPolicy::Stop,
    ));

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert!(engine.active_executions().await.is_empty());
}

#[tokio::test]
async fn reregistering_a_definition_replaces_it_in_place() {
    let calls: CallLog = Arc::default();
    let mut engine = WorkflowEngine::new();
    engine.register_workflow(definition(
        "order_followup",
        vec![scripted("first_version", WorkflowResult::succeeded(), &calls)],
        ErrorPolicy::Stop,
    ));
    engine.register_workflow(definition(
        "order_followup",
        vec![scripted("second_version", WorkflowResult::succeeded(), &calls)],
        ErrorPolicy::Stop,
    ));

    assert_eq!(engine.workflows().len(), 1);

    let result = engine
        .execute_workflow("order_followup", context(), &CancellationToken::new())
        .await;

    assert!(result.is_ok());
    assert_eq!(*calls.lock().await, vec!["second_version"]);
}
