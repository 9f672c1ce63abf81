// Workflow Engine - runs one definition against one trigger event

use automation_shared::{ActionLogEntry, ExecutionRecord, ExecutionStatus, StepStatus, TriggerType, WorkflowDefinition};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::errors::WorkflowExecutionError;
use super::executor::{ActionRegistry, StepError};
use super::repository::{SlotClaim, WorkflowRepository};
use super::variables::{self, WorkflowMeta};

pub struct ExecutionEngine {
    repository: Arc<dyn WorkflowRepository>,
    registry: Arc<ActionRegistry>,
}

impl ExecutionEngine {
    pub fn new(repository: Arc<dyn WorkflowRepository>, registry: Arc<ActionRegistry>) -> Self {
        Self { repository, registry }
    }

    /// Execute every action step in order and persist the outcome.
    ///
    /// Step failures are contained in the returned record. `Err` is only
    /// returned when the record itself cannot be persisted.
    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        trigger_type: TriggerType,
        trigger_data: serde_json::Value,
    ) -> Result<ExecutionRecord, WorkflowExecutionError> {
        let mut record = ExecutionRecord::start(workflow, trigger_type, trigger_data);

        if let SlotClaim::CapReached { count, max } = self.repository.claim_execution(workflow.id).await? {
            let cap = WorkflowExecutionError::CapReached { count, max };
            warn!(workflow_id = %workflow.id, "{}", cap);
            // persisted already terminal; counters stay untouched
            finish(&mut record, ExecutionStatus::Failed, Some(cap.to_string()));
            self.repository.create_execution(&record).await?;
            return Ok(record);
        }

        if let Err(e) = self.repository.create_execution(&record).await {
            self.release_slot(workflow).await;
            return Err(e.into());
        }
        info!(
            workflow_id = %workflow.id,
            execution_id = %record.id,
            steps = workflow.actions.len(),
            "Workflow execution started"
        );

        let outcome = AssertUnwindSafe(self.run_steps(workflow, &mut record))
            .catch_unwind()
            .await;

        let abort = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(panic) => Some(WorkflowExecutionError::Internal(panic_message(panic.as_ref()))),
        };

        match abort {
            None => {
                let status = if record.failure_count == 0 {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Partial
                };
                finish(&mut record, status, None);
            }
            Some(fault) => {
                error!(workflow_id = %workflow.id, execution_id = %record.id, "Workflow execution aborted: {}", fault);
                finish(&mut record, ExecutionStatus::Failed, Some(fault.to_string()));
            }
        }

        // aborted runs do not count against the cap
        if record.status == ExecutionStatus::Failed {
            self.release_slot(workflow).await;
        } else {
            let completed_at = record.completed_at.unwrap_or_else(Utc::now);
            self.repository.mark_executed(workflow.id, completed_at).await?;
        }

        self.repository.finalize_execution(&record).await?;

        info!(
            workflow_id = %workflow.id,
            execution_id = %record.id,
            status = ?record.status,
            succeeded = record.success_count,
            failed = record.failure_count,
            "Workflow execution finished"
        );

        Ok(record)
    }

    async fn release_slot(&self, workflow: &WorkflowDefinition) {
        if let Err(e) = self.repository.release_execution(workflow.id).await {
            error!(workflow_id = %workflow.id, "Failed to release execution slot: {}", e);
        }
    }

    async fn run_steps(
        &self,
        workflow: &WorkflowDefinition,
        record: &mut ExecutionRecord,
    ) -> Result<(), WorkflowExecutionError> {
        let meta = WorkflowMeta {
            id: workflow.id,
            name: &workflow.name,
        };

        for (index, step) in workflow.actions.iter().enumerate() {
            let config = variables::resolve(&step.config, &record.trigger_data, meta);
            let executed_at = Utc::now();
            let started = Instant::now();

            let result = self
                .registry
                .execute(step.action_type, &config, &record.trigger_data, workflow)
                .await;

            let (status, output, error) = match result {
                Ok(output) => (StepStatus::Success, Some(output), None),
                Err(StepError::Failed(err)) => {
                    warn!(workflow_id = %workflow.id, step = index, "Action failed: {}", err);
                    (StepStatus::Failed, None, Some(err.to_string()))
                }
                Err(StepError::Unregistered(err)) => return Err(err.into()),
            };

            match status {
                StepStatus::Success => record.success_count += 1,
                StepStatus::Failed => record.failure_count += 1,
            }

            record.action_log.push(ActionLogEntry {
                step: index,
                action_type: step.action_type,
                name: step.name.clone(),
                config,
                status,
                output,
                error,
                executed_at,
                duration_ms: started.elapsed().as_millis() as i64,
            });
        }

        Ok(())
    }
}

fn finish(record: &mut ExecutionRecord, status: ExecutionStatus, error_message: Option<String>) {
    let completed_at = Utc::now();
    record.status = status;
    record.error_message = error_message;
    record.duration_ms = Some((completed_at - record.started_at).num_milliseconds().max(0));
    record.completed_at = Some(completed_at);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "action handler panicked".to_string())
}
