//! Simulated agent executors.
//!
//! Stand-ins for the generative backends: each agent kind produces a
//! domain-plausible JSON artifact derived from its input and the injected
//! metrics provider. Latency is configurable and honored under cancellation.

use super::metrics::MetricsProvider;
use marketflow_sdk::{
    async_trait, AgentError, AgentExecutor, AgentType, CancellationToken,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Deterministic executor used for every agent kind in the default registry.
pub struct SimulatedExecutor {
    metrics: Arc<dyn MetricsProvider>,
    latency: Duration,
}

impl SimulatedExecutor {
    pub fn new(metrics: Arc<dyn MetricsProvider>, latency: Duration) -> Self {
        Self { metrics, latency }
    }

    fn market(&self, input: &Value) -> String {
        input
            .get("target_market")
            .and_then(Value::as_str)
            .unwrap_or("general audience")
            .to_string()
    }

    fn keywords(&self, input: &Value) -> Vec<String> {
        input
            .get("keywords")
            .and_then(Value::as_array)
            .map(|kws| {
                kws.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn artifact(&self, agent_type: AgentType, input: &Value) -> Value {
        let market = self.market(input);
        let keywords = self.keywords(input);

        match agent_type {
            AgentType::MarketAnalyzer => json!({
                "target_market": market,
                "market_size_score": self.metrics.score("market_size"),
                "competition_level": self.metrics.score("competition"),
                "audience_fit": self.metrics.rate("audience_fit"),
                "trending_keywords": keywords,
            }),
            AgentType::TrendScraper => json!({
                "target_market": market,
                "items": keywords
                    .iter()
                    .map(|kw| json!({
                        "keyword": kw,
                        "headline": format!("What {} readers are sharing this week", kw),
                        "engagement_rate": self.metrics.rate(kw),
                    }))
                    .collect::<Vec<_>>(),
                "sources_scanned": keywords.len().max(1) * 12,
            }),
            AgentType::SignalClassifier => json!({
                "signals": keywords
                    .iter()
                    .map(|kw| json!({
                        "keyword": kw,
                        "category": if self.metrics.score(kw) >= 70.0 { "rising" } else { "steady" },
                        "confidence": self.metrics.rate(kw),
                    }))
                    .collect::<Vec<_>>(),
                "noise_ratio": 1.0 - self.metrics.rate("signal_quality"),
            }),
            AgentType::TemplateOptimizer => json!({
                "template": format!("Hook {} readers with a promise, a proof, and a call to action.", market),
                "expected_open_rate": self.metrics.rate("open_rate"),
                "expected_click_rate": self.metrics.rate("click_rate"),
                "variables": ["hook", "proof_point", "call_to_action"],
            }),
            AgentType::StrategyPlanner => json!({
                "target_market": market,
                "positioning": format!("Own the '{}' conversation before competitors do.", keywords.first().cloned().unwrap_or_else(|| market.clone())),
                "channels": ["newsletter", "social", "community"],
                "budget_split": {
                    "newsletter": 0.4,
                    "social": 0.35,
                    "community": 0.25,
                },
                "confidence": self.metrics.rate("strategy_confidence"),
            }),
            AgentType::ContentGenerator => json!({
                "title": format!("The {} playbook nobody is writing", market),
                "body": format!(
                    "A long-form piece for {} built around {} proven angles.",
                    market,
                    keywords.len().max(3)
                ),
                "word_count": 900 + (self.metrics.score("depth") as u64) * 4,
                "readability_score": self.metrics.score("readability"),
            }),
            AgentType::CopyVariants => json!({
                "variants": (1..=3)
                    .map(|n| json!({
                        "id": format!("variant_{}", n),
                        "copy": format!("Variant {} for {}: lead with the strongest keyword.", n, market),
                        "predicted_ctr": self.metrics.rate(&format!("variant_{}", n)),
                    }))
                    .collect::<Vec<_>>(),
            }),
            AgentType::TemplateArchiver => json!({
                "archived": true,
                "archive_key": format!("templates/{}", market.replace(' ', "-").to_lowercase()),
                "retained_versions": 5,
            }),
        }
    }
}

#[async_trait]
impl AgentExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        agent_type: AgentType,
        input: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, AgentError> {
        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }

        Ok(self.artifact(agent_type, input))
    }
}

/// Executor that always fails with the configured message. Test collaborator
/// for the failure paths.
pub struct FailingExecutor {
    message: String,
}

impl FailingExecutor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl AgentExecutor for FailingExecutor {
    async fn execute(
        &self,
        _agent_type: AgentType,
        _input: &Value,
        _cancel: &CancellationToken,
    ) -> Result<Value, AgentError> {
        Err(AgentError::Failed(self.message.clone()))
    }
}
