//! Common test utilities for engine tests

use marketflow::agents::{AgentRegistry, FixedMetrics};
use marketflow::database::Database;
use marketflow::engine::{EngineConfig, PipelineEngine, ReviewDecision};
use marketflow_sdk::{AgentType, ReviewAction, StepSpec, Workflow};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Engine over an in-memory database and instant simulated executors.
pub fn test_engine() -> PipelineEngine {
    test_engine_with(simulated_registry(Duration::ZERO), Duration::from_secs(5))
}

/// Engine with a custom registry and executor timeout.
pub fn test_engine_with(registry: AgentRegistry, executor_timeout: Duration) -> PipelineEngine {
    let db = Database::in_memory().unwrap();
    db.initialize_schema().unwrap();
    PipelineEngine::new(
        Arc::new(db),
        Arc::new(registry),
        EngineConfig {
            executor_timeout,
            default_max_retries: 3,
        },
    )
}

pub fn simulated_registry(latency: Duration) -> AgentRegistry {
    AgentRegistry::with_simulated(Arc::new(FixedMetrics::default()), latency)
}

/// Step specs cycling through the agent kinds in pipeline order.
pub fn sample_specs(count: usize) -> Vec<StepSpec> {
    (0..count)
        .map(|i| StepSpec {
            agent_type: AgentType::ALL[i % AgentType::ALL.len()],
            input: json!({
                "target_market": "indie fantasy readers",
                "keywords": ["dragons", "found family"],
            }),
            max_retries: None,
        })
        .collect()
}

pub fn approve() -> ReviewDecision {
    ReviewDecision {
        action: ReviewAction::Approve,
        ..Default::default()
    }
}

pub fn reject(feedback: &str) -> ReviewDecision {
    ReviewDecision {
        action: ReviewAction::Reject,
        feedback: Some(feedback.to_string()),
        ..Default::default()
    }
}

/// Execute a step and approve it, asserting both succeed.
pub async fn run_and_approve(engine: &PipelineEngine, workflow_id: Uuid, step_id: Uuid) {
    let execution = engine
        .execute_step(workflow_id, step_id, None)
        .await
        .unwrap();
    assert!(execution.error.is_none(), "step failed: {:?}", execution.error);
    engine.decide(workflow_id, step_id, approve()).unwrap();
}

/// Fresh snapshot of a workflow.
pub fn reload(engine: &PipelineEngine, workflow_id: Uuid) -> Workflow {
    engine.get_workflow(&workflow_id).unwrap()
}
