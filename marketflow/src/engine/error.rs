//! Typed error taxonomy for the orchestration engine.
//!
//! Agent execution failure is deliberately absent: it is recorded on the step
//! and returned inside the execution result, never thrown past the controller
//! boundary.

use marketflow_sdk::AgentType;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("step {step_id} not found in workflow {workflow_id}")]
    StepNotFound { workflow_id: Uuid, step_id: Uuid },

    #[error("invalid review action '{0}', expected approve, reject, or modify")]
    InvalidAction(String),

    #[error("step {0} is not ready to run; the previous step must be approved first")]
    StepNotReady(Uuid),

    #[error("step {0} is not completed, so it cannot be reviewed")]
    StepNotReviewable(Uuid),

    #[error("workflow {0} already has a step in flight")]
    WorkflowBusy(Uuid),

    #[error("step {step_id} exhausted its retry budget of {max_retries}")]
    RetryBudgetExhausted { step_id: Uuid, max_retries: u32 },

    #[error("no executor registered for agent type '{0}'")]
    ExecutorNotRegistered(AgentType),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
