//! Injected metrics capability for the simulated executors.
//!
//! The simulated agents need plausible scores and rates. Pulling them from a
//! collaborator keeps the executors deterministic and lets tests pin exact
//! values.

/// Source of the numeric signals the simulated agents report.
pub trait MetricsProvider: Send + Sync {
    /// A score in [0, 100] for the named metric.
    fn score(&self, metric: &str) -> f64;

    /// A rate in [0, 1] for the named metric.
    fn rate(&self, metric: &str) -> f64 {
        self.score(metric) / 100.0
    }
}

/// Deterministic provider: every metric maps to a stable value derived from
/// its name around a configurable baseline.
#[derive(Debug, Clone)]
pub struct FixedMetrics {
    baseline: f64,
}

impl FixedMetrics {
    pub fn new(baseline: f64) -> Self {
        Self {
            baseline: baseline.clamp(0.0, 100.0),
        }
    }
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self::new(72.0)
    }
}

impl MetricsProvider for FixedMetrics {
    fn score(&self, metric: &str) -> f64 {
        // Stable per-name spread of up to ±10 around the baseline
        let spread = metric
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        let offset = (spread % 21) as f64 - 10.0;
        (self.baseline + offset).clamp(0.0, 100.0)
    }
}
