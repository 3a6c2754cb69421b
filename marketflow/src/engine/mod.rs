//! Review-gated pipeline orchestration engine
//!
//! The engine drives single steps through pending → running →
//! completed/failed (`executor`), mediates reviewer decisions (`review`),
//! recomputes workflow-level status after every mutation (`status`), and
//! serves read-only progress snapshots (`progress`).
//!
//! Step execution is explicitly triggered by callers; there is no internal
//! scheduler loop. Readiness and single-flight-per-workflow are enforced
//! here rather than trusted to callers.

pub mod error;
pub mod executor;
pub mod progress;
pub mod review;
pub mod status;

pub use error::EngineError;
pub use executor::StepExecution;
pub use review::ReviewDecision;

use crate::agents::AgentRegistry;
use crate::database::{Repository, WorkflowPatch};
use chrono::Local;
use marketflow_sdk::{
    CancellationToken, PipelineEvent, PipelineProgress, Step, StepSpec, Workflow, WorkflowStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded wait for one AgentExecutor call
    pub executor_timeout: Duration,

    /// Retry budget applied to steps whose spec does not set its own
    pub default_max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executor_timeout: Duration::from_secs(60),
            default_max_retries: 3,
        }
    }
}

/// The orchestration core: execution controller, review gate, aggregator,
/// and progress observer over a shared repository.
pub struct PipelineEngine {
    repo: Arc<dyn Repository>,
    registry: Arc<AgentRegistry>,
    config: EngineConfig,

    /// Workflows with a step currently in flight (single-flight guard)
    in_flight: Mutex<HashSet<Uuid>>,

    /// Cancellation tokens handed to executor calls, cancelled on deletion
    cancellations: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl PipelineEngine {
    pub fn new(repo: Arc<dyn Repository>, registry: Arc<AgentRegistry>, config: EngineConfig) -> Self {
        Self {
            repo,
            registry,
            config,
            in_flight: Mutex::new(HashSet::new()),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a workflow with all steps pre-materialized in pending status.
    pub fn create_workflow(&self, name: &str, specs: &[StepSpec]) -> Result<Workflow, EngineError> {
        let workflow = self
            .repo
            .create_workflow(name, specs, self.config.default_max_retries)?;
        Ok(workflow)
    }

    /// Delete a workflow, cancelling any in-flight executor call first.
    pub fn delete_workflow(&self, workflow_id: &Uuid) -> Result<(), EngineError> {
        if let Some(token) = self.cancellations.lock().unwrap().remove(workflow_id) {
            token.cancel();
        }
        if self.repo.delete_workflow(workflow_id)? {
            Ok(())
        } else {
            Err(EngineError::WorkflowNotFound(*workflow_id))
        }
    }

    pub fn get_workflow(&self, workflow_id: &Uuid) -> Result<Workflow, EngineError> {
        self.load_workflow(workflow_id)
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>, EngineError> {
        Ok(self.repo.list_workflows()?)
    }

    /// Read-only progress snapshot for polling clients.
    pub fn progress(&self, workflow_id: &Uuid) -> Result<PipelineProgress, EngineError> {
        let workflow = self.load_workflow(workflow_id)?;
        Ok(progress::compute_progress(&workflow))
    }

    pub(crate) fn load_workflow(&self, workflow_id: &Uuid) -> Result<Workflow, EngineError> {
        self.repo
            .get_workflow(workflow_id)?
            .ok_or(EngineError::WorkflowNotFound(*workflow_id))
    }

    pub(crate) fn load_step(
        &self,
        workflow: &Workflow,
        step_id: &Uuid,
    ) -> Result<Step, EngineError> {
        workflow
            .step(step_id)
            .cloned()
            .ok_or(EngineError::StepNotFound {
                workflow_id: workflow.id,
                step_id: *step_id,
            })
    }

    /// Recompute workflow status and review summary from the current step
    /// set and persist them. `completed_at` is set the first time the
    /// workflow completes and cleared if the status ever leaves completed;
    /// the two never change independently.
    pub(crate) fn refresh_workflow(&self, workflow_id: &Uuid) -> Result<Workflow, EngineError> {
        let workflow = self.load_workflow(workflow_id)?;
        let next_status = status::compute_status(&workflow.steps);
        let summary = status::compute_review_summary(&workflow.steps);

        let completed_at = match (next_status == WorkflowStatus::Completed, workflow.completed_at) {
            (true, None) => Some(Some(Local::now())),
            (false, Some(_)) => Some(None),
            _ => None,
        };

        let status_changed = next_status != workflow.status;
        let updated = self.repo.update_workflow(
            workflow_id,
            &WorkflowPatch {
                status: Some(next_status),
                review_summary: Some(summary),
                completed_at,
            },
        )?;

        if status_changed {
            PipelineEvent::WorkflowStatusChanged {
                workflow_id: *workflow_id,
                status: next_status,
            }
            .emit();
            if next_status == WorkflowStatus::Completed {
                PipelineEvent::WorkflowCompleted {
                    workflow_id: *workflow_id,
                }
                .emit();
            }
        }

        Ok(updated)
    }

    /// Claim the single-flight slot for a workflow; released on guard drop.
    pub(crate) fn claim_flight(&self, workflow_id: Uuid) -> Result<FlightGuard<'_>, EngineError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(workflow_id) {
            return Err(EngineError::WorkflowBusy(workflow_id));
        }
        Ok(FlightGuard {
            engine: self,
            workflow_id,
        })
    }

    /// Cancellation token for a workflow's executor calls.
    pub(crate) fn cancel_token(&self, workflow_id: &Uuid) -> CancellationToken {
        self.cancellations
            .lock()
            .unwrap()
            .entry(*workflow_id)
            .or_default()
            .clone()
    }
}

/// Releases a workflow's single-flight slot when execution finishes.
pub(crate) struct FlightGuard<'a> {
    engine: &'a PipelineEngine,
    workflow_id: Uuid,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .unwrap()
            .remove(&self.workflow_id);
    }
}
