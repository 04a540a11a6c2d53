use super::*;

use ruleflow_core::CancellationToken;
use ruleflow_domain::{ErrorPolicy, StepErrorPolicy, WorkflowContext, WorkflowResult, WorkflowStep};
use tracing::{info, warn};

impl WorkflowEngine {
    /// Executes one registered workflow as a sequential state machine.
    ///
    /// An unknown `workflow_id` is fatal to the call. Step failures and step
    /// errors are reported through the returned [`WorkflowResult`]; the
    /// execution record is registered in the active-executions map on entry
    /// and removed on every exit path.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        context: WorkflowContext,
        cancellation: &CancellationToken,
    ) -> EngineResult<WorkflowResult> {
        let definition = self.require_workflow(workflow_id)?.clone();
        let mut context = context;
        let mut execution = WorkflowExecution::start(&definition);
        let execution_id = execution.execution_id;
        self.active
            .lock()
            .await
            .insert(execution_id, execution.clone());

        let result = self
            .run_workflow_steps(&definition, &mut execution, &mut context, cancellation)
            .await;

        self.notify_completed(&execution).await;
        self.active.lock().await.remove(&execution_id);
        info!(
            workflow_id,
            execution_id = %execution_id,
            status = execution.status.as_str(),
            "workflow execution finished"
        );

        Ok(result)
    }

    /// Executes every registered workflow whose entity type and trigger
    /// match the supplied context.
    ///
    /// Definitions run independently in registration order, each against its
    /// own clone of the context. One definition failing, fatally or not,
    /// never prevents the remaining definitions from running.
    pub async fn execute_triggered_workflows(
        &self,
        context: &WorkflowContext,
        cancellation: &CancellationToken,
    ) -> Vec<WorkflowResult> {
        let mut results = Vec::new();
        for definition in &self.workflows {
            if definition.entity_type().as_str() != context.entity_type {
                continue;
            }

            if !definition.trigger().matches(context) {
                continue;
            }

            match self
                .execute_workflow(definition.id().as_str(), context.clone(), cancellation)
                .await
            {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(
                        workflow_id = definition.id().as_str(),
                        %error,
                        "triggered workflow did not complete"
                    );
                    results.push(
                        WorkflowResult::failed(format!(
                            "workflow '{}' did not complete",
                            definition.id().as_str()
                        ))
                        .with_error(error.to_string()),
                    );
                }
            }
        }

        results
    }

    async fn run_workflow_steps(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut WorkflowExecution,
        context: &mut WorkflowContext,
        cancellation: &CancellationToken,
    ) -> WorkflowResult {
        let steps = definition.steps();
        while execution.current_step < steps.len() {
            if cancellation.is_cancelled() {
                execution.finish(ExecutionStatus::Cancelled);
                return WorkflowResult::failed(format!(
                    "workflow '{}' cancelled before step '{}'",
                    definition.id().as_str(),
                    steps[execution.current_step].id().as_str()
                ));
            }

            let index = execution.current_step;
            let step = &steps[index];
            execution.set_step_status(index, StepStatus::Running);
            self.store_snapshot(execution).await;

            if let Some(condition) = step.condition()
                && !condition.evaluate(context)
            {
                execution.set_step_status(index, StepStatus::Skipped);
                execution.current_step += 1;
                continue;
            }

            match self.run_step_action(step, context).await {
                Err(error) => {
                    warn!(
                        workflow_id = definition.id().as_str(),
                        step_id = step.id().as_str(),
                        %error,
                        "workflow step raised an error"
                    );
                    execution.set_step_status(index, StepStatus::Failed);
                    execution.finish(ExecutionStatus::Failed);
                    return WorkflowResult::failed(format!(
                        "step '{}' did not complete",
                        step.id().as_str()
                    ))
                    .with_error(error.to_string());
                }
                Ok(result) if result.success => {
                    execution.set_step_status(index, StepStatus::Completed);
                    context.merge_metadata(&result.data);

                    match result
                        .next_step
                        .as_deref()
                        .and_then(|step_id| definition.step_index(step_id))
                    {
                        Some(target) if target <= index => {
                            execution.finish(ExecutionStatus::Failed);
                            return WorkflowResult::failed(format!(
                                "step '{}' requested a backwards jump, refusing to loop",
                                step.id().as_str()
                            ));
                        }
                        Some(target) => execution.current_step = target,
                        None => execution.current_step += 1,
                    }
                }
                Ok(result) => {
                    execution.set_step_status(index, StepStatus::Failed);
                    let continue_past_failure = step.error_handling()
                        == Some(StepErrorPolicy::Continue)
                        || definition.error_handling() == ErrorPolicy::Continue;
                    if continue_past_failure {
                        execution.current_step += 1;
                        continue;
                    }

                    execution.finish(ExecutionStatus::Failed);
                    return result;
                }
            }
        }

        execution.finish(ExecutionStatus::Completed);
        WorkflowResult::succeeded_with_data(context.metadata.clone())
    }

    /// Invokes one step's action, re-invoking returned failures when the
    /// step opted into the retry policy. An `Err` is never retried.
    async fn run_step_action(
        &self,
        step: &WorkflowStep,
        context: &WorkflowContext,
    ) -> EngineResult<WorkflowResult> {
        let attempt_budget = if step.error_handling() == Some(StepErrorPolicy::Retry) {
            step.max_attempts()
        } else {
            1
        };

        let mut outcome = step.action().run(context).await?;
        let mut attempt = 1;
        while !outcome.success && attempt < attempt_budget {
            attempt += 1;
            debug!(step_id = step.id().as_str(), attempt, "retrying failed step");
            outcome = step.action().run(context).await?;
        }

        Ok(outcome)
    }
}
