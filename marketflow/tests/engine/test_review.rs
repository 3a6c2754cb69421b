//! Tests for the review gate

use super::common::*;
use marketflow::engine::{EngineError, ReviewDecision};
use marketflow_sdk::{ReviewAction, ReviewStatus, StepStatus, WorkflowStatus};
use serde_json::json;

#[tokio::test]
async fn reject_resets_the_step_to_pending() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let step_id = workflow.steps[0].id;

    engine.execute_step(workflow.id, step_id, None).await.unwrap();
    engine
        .decide(workflow.id, step_id, reject("numbers look invented"))
        .unwrap();

    let workflow = reload(&engine, workflow.id);
    let step = workflow.step(&step_id).unwrap();
    assert_eq!(step.status, StepStatus::Pending);
    assert_eq!(step.review_status, ReviewStatus::Rejected);
    assert_eq!(step.feedback.as_deref(), Some("numbers look invented"));

    // The produced output survives the rejection and is archived
    assert!(step.output.is_some());
    let corrections = step.corrections.as_ref().unwrap();
    assert_eq!(corrections["originalOutput"], *step.output.as_ref().unwrap());

    // Rejection never readies the successor
    assert!(!workflow.steps[1].ready);
    assert_eq!(workflow.status, WorkflowStatus::NeedsReview);
}

#[tokio::test]
async fn approve_readies_the_next_step_only() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let step_id = workflow.steps[0].id;

    engine.execute_step(workflow.id, step_id, None).await.unwrap();
    engine.decide(workflow.id, step_id, approve()).unwrap();

    let workflow = reload(&engine, workflow.id);
    assert_eq!(
        workflow.step(&step_id).unwrap().review_status,
        ReviewStatus::Approved
    );
    assert!(workflow.step(&step_id).unwrap().reviewed_at.is_some());
    assert!(workflow.steps[1].ready);
    assert!(!workflow.steps[2].ready);

    // One approved step with an untouched tail: no rule matches, so pending
    assert_eq!(workflow.status, WorkflowStatus::Pending);
}

#[tokio::test]
async fn modify_archives_originals_and_applies_replacements() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(2)).unwrap();
    let step_id = workflow.steps[0].id;

    engine.execute_step(workflow.id, step_id, None).await.unwrap();
    let before = reload(&engine, workflow.id);
    let original_input = before.step(&step_id).unwrap().input.clone();
    let original_output = before.step(&step_id).unwrap().output.clone().unwrap();

    let replacement_output = json!({"market_size_score": 95.0, "note": "reviewer adjusted"});
    engine
        .decide(
            workflow.id,
            step_id,
            ReviewDecision {
                action: ReviewAction::Modify,
                feedback: Some("bumped the score".to_string()),
                corrections: Some(json!({"tone": "warmer"})),
                modified_input: None,
                modified_output: Some(replacement_output.clone()),
            },
        )
        .unwrap();

    let workflow = reload(&engine, workflow.id);
    let step = workflow.step(&step_id).unwrap();
    assert_eq!(step.review_status, ReviewStatus::Modified);
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.output.as_ref().unwrap(), &replacement_output);
    assert_eq!(step.input, original_input);

    let corrections = step.corrections.as_ref().unwrap();
    assert_eq!(corrections["originalInput"], original_input);
    assert_eq!(corrections["originalOutput"], original_output);
    assert_eq!(corrections["tone"], json!("warmer"));

    // Modify is approve-with-edits: the successor becomes ready
    assert!(workflow.steps[1].ready);
}

#[tokio::test]
async fn reapproving_an_approved_step_rerecords_feedback() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(1)).unwrap();
    let step_id = workflow.steps[0].id;

    engine.execute_step(workflow.id, step_id, None).await.unwrap();
    engine.decide(workflow.id, step_id, approve()).unwrap();

    let second = engine
        .decide(
            workflow.id,
            step_id,
            ReviewDecision {
                action: ReviewAction::Approve,
                feedback: Some("double-checked".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(second.review_status, ReviewStatus::Approved);
    assert_eq!(second.feedback.as_deref(), Some("double-checked"));
}

#[tokio::test]
async fn only_completed_steps_can_be_reviewed() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(2)).unwrap();
    let pending_step = workflow.steps[1].id;

    let err = engine
        .decide(workflow.id, pending_step, approve())
        .unwrap_err();
    assert!(matches!(err, EngineError::StepNotReviewable(id) if id == pending_step));
}

#[tokio::test]
async fn rejecting_an_approved_step_uncompletes_the_workflow() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let ids: Vec<_> = workflow.steps.iter().map(|s| s.id).collect();

    for id in &ids {
        run_and_approve(&engine, workflow.id, *id).await;
    }
    let completed = reload(&engine, workflow.id);
    assert_eq!(completed.status, WorkflowStatus::Completed);
    assert!(completed.completed_at.is_some());

    // A later rejection must leave completed and clear the timestamp together
    engine
        .decide(workflow.id, ids[1], reject("second look needed"))
        .unwrap();

    let workflow = reload(&engine, workflow.id);
    assert_eq!(workflow.status, WorkflowStatus::NeedsReview);
    assert!(workflow.completed_at.is_none());
    assert_eq!(workflow.review_summary.rejected, 1);
}
