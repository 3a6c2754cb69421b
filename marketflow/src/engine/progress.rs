//! Progress Observer
//!
//! Read-only computation of a workflow's visual progress for polling clients.
//! Works on a single workflow snapshot, so concurrent writers can at worst
//! make the result slightly stale, never torn.

use marketflow_sdk::{ActiveStep, PipelineProgress, StepStatus, Workflow, WorkflowStatus};

/// Fallback step count for a workflow with zero materialized steps. Should
/// not occur post-creation but must be tolerated without crashing.
pub const DEFAULT_TOTAL_STEPS: usize = 8;

/// Compute the progress view for one workflow snapshot.
pub fn compute_progress(workflow: &Workflow) -> PipelineProgress {
    let total_steps = if workflow.steps.is_empty() {
        DEFAULT_TOTAL_STEPS
    } else {
        workflow.steps.len()
    };

    let completed_steps = workflow
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count();

    let running = workflow
        .steps
        .iter()
        .find(|s| s.status == StepStatus::Running);

    let current_step = completed_steps + usize::from(running.is_some());

    let progress_percent =
        ((100.0 * completed_steps as f64 / total_steps as f64).round()) as u8;

    let active_step = running
        .or_else(|| {
            workflow
                .steps
                .iter()
                .find(|s| s.status == StepStatus::Failed)
        })
        .map(|s| ActiveStep {
            id: s.id,
            agent_type: s.agent_type,
            status: s.status,
            error: s.error.clone(),
        });

    let is_running = matches!(
        workflow.status,
        WorkflowStatus::Running | WorkflowStatus::Pending
    ) || active_step
        .as_ref()
        .is_some_and(|s| s.status == StepStatus::Running);

    PipelineProgress {
        workflow_id: workflow.id,
        total_steps,
        completed_steps,
        current_step,
        progress_percent,
        active_step,
        is_running,
    }
}
