//! End-to-end pipeline runs through the engine

use super::common::*;
use marketflow::engine::EngineError;
use marketflow::pipeline::default_pipeline;
use marketflow_sdk::{ReviewStatus, StepStatus, WorkflowStatus};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn default_pipeline_runs_to_completion_under_review() {
    let engine = test_engine();
    let specs = default_pipeline(
        "indie fantasy readers",
        &["dragons".to_string(), "found family".to_string()],
    );
    let workflow = engine.create_workflow("fantasy-launch", &specs).unwrap();
    assert_eq!(workflow.steps.len(), 8);

    // Drive the pipeline the way a caller would: run the ready step, review
    // it, move on.
    loop {
        let snapshot = reload(&engine, workflow.id);
        let Some(step) = snapshot.next_runnable() else {
            break;
        };
        run_and_approve(&engine, workflow.id, step.id).await;
    }

    let finished = reload(&engine, workflow.id);
    assert_eq!(finished.status, WorkflowStatus::Completed);
    assert!(finished.completed_at.is_some());
    assert!(finished
        .steps
        .iter()
        .all(|s| s.review_status.is_accepted()));

    let progress = engine.progress(&workflow.id).unwrap();
    assert_eq!(progress.progress_percent, 100);
    assert_eq!(progress.current_step, 8);
    assert!(!progress.is_running);
}

#[tokio::test]
async fn rejected_step_reruns_and_the_pipeline_recovers() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let ids: Vec<_> = workflow.steps.iter().map(|s| s.id).collect();

    run_and_approve(&engine, workflow.id, ids[0]).await;

    engine.execute_step(workflow.id, ids[1], None).await.unwrap();
    engine
        .decide(workflow.id, ids[1], reject("angle is too generic"))
        .unwrap();
    assert_eq!(
        reload(&engine, workflow.id).status,
        WorkflowStatus::NeedsReview
    );

    // Re-run consumes one retry and goes back through review
    run_and_approve(&engine, workflow.id, ids[1]).await;
    let snapshot = reload(&engine, workflow.id);
    let step = snapshot.step(&ids[1]).unwrap();
    assert_eq!(step.retry_count, 1);
    assert_eq!(step.review_status, ReviewStatus::Approved);

    run_and_approve(&engine, workflow.id, ids[2]).await;
    assert_eq!(
        reload(&engine, workflow.id).status,
        WorkflowStatus::Completed
    );
}

#[tokio::test]
async fn deleting_a_workflow_cancels_its_running_step() {
    let registry = simulated_registry(Duration::from_secs(30));
    let engine = Arc::new(test_engine_with(registry, Duration::from_secs(60)));

    let workflow = engine.create_workflow("launch", &sample_specs(1)).unwrap();
    let step_id = workflow.steps[0].id;

    let background = {
        let engine = engine.clone();
        let workflow_id = workflow.id;
        tokio::spawn(async move { engine.execute_step(workflow_id, step_id, None).await })
    };

    // Let the executor call get in flight, then pull the workflow out
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.delete_workflow(&workflow.id).unwrap();

    let execution = background.await.unwrap().unwrap();
    assert_eq!(execution.status, StepStatus::Failed);
    assert!(execution.error.as_deref().unwrap().contains("cancelled"));

    let err = engine.get_workflow(&workflow.id).unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotFound(_)));
}

#[tokio::test]
async fn deleting_an_unknown_workflow_is_an_error() {
    let engine = test_engine();
    let err = engine.delete_workflow(&uuid::Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotFound(_)));
}
