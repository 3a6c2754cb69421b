//! Tests for the progress observer over live engine state

use super::common::*;
use marketflow_sdk::{StepStatus, WorkflowStatus};

#[tokio::test]
async fn fresh_workflow_reports_zero_progress() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();

    let progress = engine.progress(&workflow.id).unwrap();
    assert_eq!(progress.total_steps, 3);
    assert_eq!(progress.current_step, 0);
    assert_eq!(progress.completed_steps, 0);
    assert_eq!(progress.progress_percent, 0);
    assert!(progress.active_step.is_none());
    assert!(progress.is_running);
}

#[tokio::test]
async fn percent_is_non_decreasing_across_a_clean_run() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(4)).unwrap();
    let ids: Vec<_> = workflow.steps.iter().map(|s| s.id).collect();

    let mut last_percent = 0;
    for id in ids {
        run_and_approve(&engine, workflow.id, id).await;
        let progress = engine.progress(&workflow.id).unwrap();
        assert!(
            progress.progress_percent >= last_percent,
            "{} < {}",
            progress.progress_percent,
            last_percent
        );
        last_percent = progress.progress_percent;
    }
    assert_eq!(last_percent, 100);
}

#[tokio::test]
async fn failed_step_becomes_the_active_step() {
    use marketflow::agents::simulated::FailingExecutor;
    use marketflow_sdk::AgentType;
    use std::sync::Arc;
    use std::time::Duration;

    let mut registry = simulated_registry(Duration::ZERO);
    registry.register(
        AgentType::MarketAnalyzer,
        Arc::new(FailingExecutor::new("no data source")),
    );
    let engine = test_engine_with(registry, Duration::from_secs(5));

    let workflow = engine.create_workflow("launch", &sample_specs(2)).unwrap();
    engine
        .execute_step(workflow.id, workflow.steps[0].id, None)
        .await
        .unwrap();

    let progress = engine.progress(&workflow.id).unwrap();
    let active = progress.active_step.unwrap();
    assert_eq!(active.status, StepStatus::Failed);
    assert!(active.error.as_deref().unwrap().contains("no data source"));
    assert!(!progress.is_running);
}

#[tokio::test]
async fn reads_without_writes_are_identical() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    run_and_approve(&engine, workflow.id, workflow.steps[0].id).await;

    let first = engine.progress(&workflow.id).unwrap();
    let second = engine.progress(&workflow.id).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn full_approval_completes_the_workflow_once() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let ids: Vec<_> = workflow.steps.iter().map(|s| s.id).collect();

    for id in &ids {
        run_and_approve(&engine, workflow.id, *id).await;
    }

    let workflow = reload(&engine, workflow.id);
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    let completed_at = workflow.completed_at.expect("completed_at must be set");

    let summary = workflow.review_summary;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.approved, 3);
    assert_eq!(summary.rejected, 0);

    // An idempotent re-approval must not move the completion timestamp
    engine.decide(workflow.id, ids[0], approve()).unwrap();
    let workflow = reload(&engine, workflow.id);
    assert_eq!(workflow.completed_at, Some(completed_at));
}
