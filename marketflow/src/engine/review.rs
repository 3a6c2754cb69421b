//! Review Gate
//!
//! Mediates human-in-the-loop approval of a completed step. Approve and
//! modify mark the next step in creation order ready (a readiness flag for
//! the caller, not an execution trigger); reject resets the step to pending
//! so it must be re-executed.

use super::{EngineError, PipelineEngine};
use crate::database::StepPatch;
use chrono::Local;
use marketflow_sdk::{
    PipelineEvent, ReviewAction, ReviewStatus, Step, StepStatus, Workflow,
};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A reviewer decision on one completed step.
///
/// `modified_input`/`modified_output` are honored by the `modify` action
/// only; the pre-decision payloads are archived under
/// `corrections.originalInput`/`corrections.originalOutput` before being
/// overwritten.
#[derive(Debug, Clone, Default)]
pub struct ReviewDecision {
    pub action: ReviewAction,
    pub feedback: Option<String>,
    pub corrections: Option<Value>,
    pub modified_input: Option<Value>,
    pub modified_output: Option<Value>,
}

impl PipelineEngine {
    /// Record a reviewer decision on a completed step.
    ///
    /// Re-issuing an `approve` on an already-approved step is accepted and
    /// re-records feedback and timestamp. Unknown action strings must be
    /// rejected as [`EngineError::InvalidAction`] before constructing a
    /// [`ReviewDecision`]; see `ReviewAction::from_str`.
    pub fn decide(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<Step, EngineError> {
        let workflow = self.load_workflow(&workflow_id)?;
        let step = self.load_step(&workflow, &step_id)?;

        // Review state only transitions while the step is completed
        if step.status != StepStatus::Completed {
            return Err(EngineError::StepNotReviewable(step_id));
        }

        let now = Local::now();
        let updated = match decision.action {
            ReviewAction::Approve => {
                let approved = self.repo.update_step(
                    &step_id,
                    &StepPatch {
                        review_status: Some(ReviewStatus::Approved),
                        feedback: decision.feedback.clone().map(Some),
                        reviewed_at: Some(Some(now)),
                        ..Default::default()
                    },
                )?;
                self.ready_next_step(&workflow, step.position)?;
                approved
            }
            ReviewAction::Modify => {
                let mut archive = vec![("originalInput", step.input.clone())];
                if let Some(ref output) = step.output {
                    archive.push(("originalOutput", output.clone()));
                }
                let corrections = merge_corrections(
                    step.corrections.as_ref(),
                    decision.corrections.as_ref(),
                    archive,
                );

                let modified = self.repo.update_step(
                    &step_id,
                    &StepPatch {
                        review_status: Some(ReviewStatus::Modified),
                        input: decision.modified_input.clone(),
                        output: decision.modified_output.clone().map(Some),
                        feedback: decision.feedback.clone().map(Some),
                        corrections: Some(Some(corrections)),
                        reviewed_at: Some(Some(now)),
                        ..Default::default()
                    },
                )?;
                self.ready_next_step(&workflow, step.position)?;
                modified
            }
            ReviewAction::Reject => {
                // Archive the produced output before a later modify can
                // overwrite it; the output itself stays on the step.
                let archive = match step.output {
                    Some(ref output) => vec![("originalOutput", output.clone())],
                    None => Vec::new(),
                };
                let corrections = merge_corrections(
                    step.corrections.as_ref(),
                    decision.corrections.as_ref(),
                    archive,
                );

                self.repo.update_step(
                    &step_id,
                    &StepPatch {
                        status: Some(StepStatus::Pending),
                        review_status: Some(ReviewStatus::Rejected),
                        feedback: decision.feedback.clone().map(Some),
                        corrections: Some(Some(corrections)),
                        reviewed_at: Some(Some(now)),
                        ..Default::default()
                    },
                )?
            }
        };

        self.refresh_workflow(&workflow_id)?;

        PipelineEvent::ReviewRecorded {
            workflow_id,
            step_id,
            action: decision.action,
        }
        .emit();

        Ok(updated)
    }

    /// Flag the step after `position` as eligible to run. Readiness is a
    /// signal for the caller, never an execution trigger.
    fn ready_next_step(&self, workflow: &Workflow, position: usize) -> Result<(), EngineError> {
        let Some(next) = workflow.steps.iter().find(|s| s.position == position + 1) else {
            return Ok(());
        };
        if next.ready {
            return Ok(());
        }

        self.repo.update_step(
            &next.id,
            &StepPatch {
                ready: Some(true),
                ..Default::default()
            },
        )?;

        PipelineEvent::StepReadied {
            workflow_id: workflow.id,
            step_id: next.id,
            position: next.position,
        }
        .emit();

        Ok(())
    }
}

/// Merge reviewer-supplied corrections over the existing ones, then overlay
/// the archived payload keys so they cannot be clobbered by the reviewer.
fn merge_corrections(
    existing: Option<&Value>,
    supplied: Option<&Value>,
    archive: Vec<(&str, Value)>,
) -> Value {
    let mut merged = existing
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);

    match supplied {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        Some(other) => {
            merged.insert("annotation".to_string(), other.clone());
        }
        None => {}
    }

    for (key, value) in archive {
        merged.insert(key.to_string(), value);
    }

    Value::Object(merged)
}
