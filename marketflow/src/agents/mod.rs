//! Agent executor registry and simulated implementations.
//!
//! Dispatch is a closed mapping from [`AgentType`] to an executor; there is
//! no string-matched fallback. Unregistered kinds surface as an engine error
//! at execution time.

pub mod metrics;
pub mod simulated;

pub use metrics::{FixedMetrics, MetricsProvider};
pub use simulated::SimulatedExecutor;

use marketflow_sdk::{AgentExecutor, AgentType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Maps each agent kind to the executor that implements it.
pub struct AgentRegistry {
    executors: HashMap<AgentType, Arc<dyn AgentExecutor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry with the simulated executor behind every agent kind.
    pub fn with_simulated(metrics: Arc<dyn MetricsProvider>, latency: Duration) -> Self {
        let executor: Arc<dyn AgentExecutor> = Arc::new(SimulatedExecutor::new(metrics, latency));
        let mut registry = Self::new();
        for agent_type in AgentType::ALL {
            registry.register(agent_type, executor.clone());
        }
        registry
    }

    /// Register (or replace) the executor for one agent kind.
    pub fn register(&mut self, agent_type: AgentType, executor: Arc<dyn AgentExecutor>) {
        self.executors.insert(agent_type, executor);
    }

    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn AgentExecutor>> {
        self.executors.get(&agent_type).cloned()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::with_simulated(Arc::new(FixedMetrics::default()), Duration::from_millis(0))
    }
}
