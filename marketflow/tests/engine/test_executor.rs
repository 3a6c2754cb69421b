//! Tests for the execution controller

use super::common::*;
use marketflow::agents::simulated::FailingExecutor;
use marketflow::engine::EngineError;
use marketflow_sdk::{AgentType, ReviewStatus, StepStatus, WorkflowStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn successful_step_completes_and_awaits_review() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let step_id = workflow.steps[0].id;

    let execution = engine
        .execute_step(workflow.id, step_id, None)
        .await
        .unwrap();

    assert_eq!(execution.status, StepStatus::Completed);
    assert!(execution.output.is_some());
    assert!(execution.error.is_none());

    let workflow = reload(&engine, workflow.id);
    let step = workflow.step(&step_id).unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.review_status, ReviewStatus::Pending);
    assert!(step.completed_at.is_some());
    assert_eq!(workflow.status, WorkflowStatus::ReviewPending);

    let progress = engine.progress(&workflow.id).unwrap();
    assert_eq!(progress.progress_percent, 33);
}

#[tokio::test]
async fn supplied_input_overrides_and_persists() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(1)).unwrap();
    let step_id = workflow.steps[0].id;

    let override_input = json!({
        "target_market": "solarpunk readers",
        "keywords": ["hope"],
    });
    engine
        .execute_step(workflow.id, step_id, Some(override_input.clone()))
        .await
        .unwrap();

    let workflow = reload(&engine, workflow.id);
    assert_eq!(workflow.step(&step_id).unwrap().input, override_input);
}

#[tokio::test]
async fn failed_execution_is_recorded_not_thrown() {
    let mut registry = simulated_registry(Duration::ZERO);
    registry.register(
        AgentType::MarketAnalyzer,
        Arc::new(FailingExecutor::new("timeout")),
    );
    let engine = test_engine_with(registry, Duration::from_secs(5));

    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let step_id = workflow.steps[0].id;

    let execution = engine
        .execute_step(workflow.id, step_id, None)
        .await
        .unwrap();
    assert_eq!(execution.status, StepStatus::Failed);
    assert!(execution.error.as_deref().unwrap().contains("timeout"));
    assert!(execution.output.is_none());

    let workflow = reload(&engine, workflow.id);
    let step = workflow.step(&step_id).unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert!(step.error.is_some());
    // output and error are mutually exclusive
    assert!(step.output.is_none());
    assert!(step.completed_at.is_none());
    assert_eq!(workflow.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn steps_cannot_run_before_they_are_ready() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(3)).unwrap();
    let second = workflow.steps[1].id;

    let err = engine
        .execute_step(workflow.id, second, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StepNotReady(id) if id == second));
}

#[tokio::test]
async fn unknown_ids_surface_as_not_found() {
    let engine = test_engine();
    let workflow = engine.create_workflow("launch", &sample_specs(1)).unwrap();

    let err = engine
        .execute_step(Uuid::new_v4(), workflow.steps[0].id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotFound(_)));

    let err = engine
        .execute_step(workflow.id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StepNotFound { .. }));
}

#[tokio::test]
async fn retry_budget_is_enforced_after_rejections() {
    let engine = test_engine();
    let specs = vec![marketflow_sdk::StepSpec {
        agent_type: AgentType::MarketAnalyzer,
        input: json!({"target_market": "indie fantasy readers"}),
        max_retries: Some(1),
    }];
    let workflow = engine.create_workflow("launch", &specs).unwrap();
    let step_id = workflow.steps[0].id;

    // First run is free; each re-run after a rejection consumes budget
    engine.execute_step(workflow.id, step_id, None).await.unwrap();
    engine.decide(workflow.id, step_id, reject("wrong tone")).unwrap();
    engine.execute_step(workflow.id, step_id, None).await.unwrap();
    engine.decide(workflow.id, step_id, reject("still off")).unwrap();

    let err = engine
        .execute_step(workflow.id, step_id, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::RetryBudgetExhausted { max_retries: 1, .. }
    ));

    let workflow = reload(&engine, workflow.id);
    assert_eq!(workflow.step(&step_id).unwrap().retry_count, 1);
}

#[tokio::test]
async fn executor_calls_are_bounded_by_the_timeout() {
    let registry = simulated_registry(Duration::from_secs(30));
    let engine = test_engine_with(registry, Duration::from_millis(50));

    let workflow = engine.create_workflow("launch", &sample_specs(1)).unwrap();
    let step_id = workflow.steps[0].id;

    let execution = engine
        .execute_step(workflow.id, step_id, None)
        .await
        .unwrap();
    assert_eq!(execution.status, StepStatus::Failed);
    assert!(execution.error.as_deref().unwrap().contains("timed out"));

    let workflow = reload(&engine, workflow.id);
    assert_eq!(workflow.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn concurrent_triggers_on_one_workflow_fail_fast() {
    let registry = simulated_registry(Duration::from_millis(500));
    let engine = Arc::new(test_engine_with(registry, Duration::from_secs(5)));

    let workflow = engine.create_workflow("launch", &sample_specs(1)).unwrap();
    let step_id = workflow.steps[0].id;

    let background = {
        let engine = engine.clone();
        let workflow_id = workflow.id;
        tokio::spawn(async move { engine.execute_step(workflow_id, step_id, None).await })
    };

    // Let the first trigger claim the flight slot
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = engine
        .execute_step(workflow.id, step_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WorkflowBusy(id) if id == workflow.id));

    let execution = background.await.unwrap().unwrap();
    assert_eq!(execution.status, StepStatus::Completed);
}
