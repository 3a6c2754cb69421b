//! Execution Controller
//!
//! Runs exactly one identified step end-to-end: readiness and retry-budget
//! checks, the running transition, the bounded executor call, and the
//! completed/failed transition. Agent failure is recorded on the step and
//! returned in the result envelope; it never aborts the workflow.

use super::{EngineError, PipelineEngine};
use crate::database::StepPatch;
use chrono::Local;
use marketflow_sdk::{
    AgentError, PipelineEvent, ReviewStatus, StepStatus,
};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Result of one `execute_step` call.
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub step_id: Uuid,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl PipelineEngine {
    /// Run one step through its agent executor.
    ///
    /// Preconditions enforced here: the step exists and belongs to the
    /// workflow, its readiness flag is set, no other step of the workflow is
    /// in flight, and a re-execution still has retry budget. `input`, when
    /// supplied, overrides the stored input for this run and is persisted.
    pub async fn execute_step(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        input: Option<Value>,
    ) -> Result<StepExecution, EngineError> {
        let workflow = self.load_workflow(&workflow_id)?;
        let step = self.load_step(&workflow, &step_id)?;

        if !step.ready {
            return Err(EngineError::StepNotReady(step_id));
        }

        let _flight = self.claim_flight(workflow_id)?;

        // A re-run after rejection or failure consumes retry budget; the
        // first execution does not.
        let is_retry =
            step.review_status == ReviewStatus::Rejected || step.status == StepStatus::Failed;
        if is_retry && step.retry_count >= step.max_retries {
            return Err(EngineError::RetryBudgetExhausted {
                step_id,
                max_retries: step.max_retries,
            });
        }

        let executor = self
            .registry
            .get(step.agent_type)
            .ok_or(EngineError::ExecutorNotRegistered(step.agent_type))?;

        let run_input = input.unwrap_or_else(|| step.input.clone());

        // Transition to running in a single patch, clearing any stale result
        // from a previous run. Review status resets so a re-executed step is
        // reviewed again.
        self.repo.update_step(
            &step_id,
            &StepPatch {
                status: Some(StepStatus::Running),
                input: Some(run_input.clone()),
                output: Some(None),
                error: Some(None),
                review_status: Some(ReviewStatus::Pending),
                retry_count: Some(step.retry_count + u32::from(is_retry)),
                completed_at: Some(None),
                ..Default::default()
            },
        )?;
        self.refresh_workflow(&workflow_id)?;

        PipelineEvent::StepStarted {
            workflow_id,
            step_id,
            agent_type: step.agent_type,
            position: step.position,
        }
        .emit();

        let cancel = self.cancel_token(&workflow_id);
        let started = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(
                self.config.executor_timeout,
                executor.execute(step.agent_type, &run_input, &cancel),
            ) => match result {
                Ok(inner) => inner,
                Err(_) => Err(AgentError::Timeout),
            },
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                self.repo.update_step(
                    &step_id,
                    &StepPatch {
                        status: Some(StepStatus::Completed),
                        output: Some(Some(output.clone())),
                        error: Some(None),
                        completed_at: Some(Some(Local::now())),
                        ..Default::default()
                    },
                )?;
                self.refresh_workflow(&workflow_id)?;

                PipelineEvent::StepCompleted {
                    workflow_id,
                    step_id,
                    agent_type: step.agent_type,
                    duration_ms,
                }
                .emit();

                Ok(StepExecution {
                    step_id,
                    status: StepStatus::Completed,
                    output: Some(output),
                    error: None,
                    duration_ms,
                })
            }
            Err(agent_error) => {
                let message = agent_error.to_string();
                let patch = StepPatch {
                    status: Some(StepStatus::Failed),
                    output: Some(None),
                    error: Some(Some(message.clone())),
                    completed_at: Some(None),
                    ..Default::default()
                };

                if matches!(agent_error, AgentError::Cancelled) {
                    // Cancellation usually races workflow deletion; the step
                    // may already be gone, which is not an error here.
                    let _ = self.repo.update_step(&step_id, &patch);
                    let _ = self.refresh_workflow(&workflow_id);
                } else {
                    self.repo.update_step(&step_id, &patch)?;
                    self.refresh_workflow(&workflow_id)?;
                }

                PipelineEvent::StepFailed {
                    workflow_id,
                    step_id,
                    agent_type: step.agent_type,
                    error: message.clone(),
                }
                .emit();

                Ok(StepExecution {
                    step_id,
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(message),
                    duration_ms,
                })
            }
        }
    }
}
