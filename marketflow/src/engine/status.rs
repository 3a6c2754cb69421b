//! Workflow Status Aggregator
//!
//! Pure functions from the step set to the workflow-level status and review
//! summary. No external calls; the engine invokes these after every step or
//! review mutation and persists the result.

use marketflow_sdk::{ReviewStatus, ReviewSummary, Step, StepStatus, WorkflowStatus};

/// Recompute the workflow status from its steps.
///
/// Rules, in priority order:
/// 1. every step approved or modified        → completed
/// 2. any step rejected                      → needs_review
/// 3. any completed step awaiting a decision → review_pending
/// 4. any step running                       → running
/// 5. any step failed                        → failed
/// 6. otherwise                              → pending
pub fn compute_status(steps: &[Step]) -> WorkflowStatus {
    // An empty step set is pending, not vacuously completed
    if steps.is_empty() {
        return WorkflowStatus::Pending;
    }

    if steps.iter().all(|s| s.review_status.is_accepted()) {
        return WorkflowStatus::Completed;
    }
    if steps
        .iter()
        .any(|s| s.review_status == ReviewStatus::Rejected)
    {
        return WorkflowStatus::NeedsReview;
    }
    if steps.iter().any(|s| s.awaiting_review()) {
        return WorkflowStatus::ReviewPending;
    }
    if steps.iter().any(|s| s.status == StepStatus::Running) {
        return WorkflowStatus::Running;
    }
    if steps.iter().any(|s| s.status == StepStatus::Failed) {
        return WorkflowStatus::Failed;
    }
    WorkflowStatus::Pending
}

/// Recompute the derived review counters from the steps.
pub fn compute_review_summary(steps: &[Step]) -> ReviewSummary {
    ReviewSummary {
        total: steps.len(),
        completed: steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count(),
        pending: steps.iter().filter(|s| s.awaiting_review()).count(),
        approved: steps
            .iter()
            .filter(|s| s.review_status.is_accepted())
            .count(),
        rejected: steps
            .iter()
            .filter(|s| s.review_status == ReviewStatus::Rejected)
            .count(),
    }
}
