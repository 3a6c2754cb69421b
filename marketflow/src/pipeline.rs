//! Pipeline definitions.
//!
//! The default eight-step marketing pipeline, plus loading of user-defined
//! pipelines from YAML spec files.

use anyhow::{Context, Result};
use marketflow_sdk::{AgentType, StepSpec};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

/// One step in a YAML pipeline spec file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineStepSpec {
    /// Agent kind, e.g. `market_analyzer`
    pub agent: AgentType,

    /// Input payload handed to the agent
    #[serde(default = "empty_object")]
    pub input: Value,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// A user-defined pipeline loaded from YAML.
///
/// ```yaml
/// name: indie-fantasy-launch
/// steps:
///   - agent: market_analyzer
///     input:
///       target_market: indie fantasy readers
///   - agent: trend_scraper
///     input:
///       keywords: [dragons, found family]
///     max_retries: 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub steps: Vec<PipelineStepSpec>,
}

impl PipelineSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline spec {}", path.display()))?;
        let spec: PipelineSpec = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid pipeline spec {}", path.display()))?;
        Ok(spec)
    }

    pub fn step_specs(&self) -> Vec<StepSpec> {
        self.steps
            .iter()
            .map(|s| StepSpec {
                agent_type: s.agent,
                input: s.input.clone(),
                max_retries: s.max_retries,
            })
            .collect()
    }
}

fn empty_object() -> Value {
    json!({})
}

/// The default pipeline: all eight agents in order, each fed the target
/// market and keywords.
pub fn default_pipeline(target_market: &str, keywords: &[String]) -> Vec<StepSpec> {
    AgentType::ALL
        .iter()
        .map(|agent_type| StepSpec {
            agent_type: *agent_type,
            input: json!({
                "target_market": target_market,
                "keywords": keywords,
            }),
            max_retries: None,
        })
        .collect()
}
