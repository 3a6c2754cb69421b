//! Environment-backed application configuration.
//!
//! Values come from the environment (a `.env` file is honored via dotenv in
//! `main`), with defaults matching a local single-user install under
//! `~/.marketflow`.

use crate::engine::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,

    /// Bounded wait for one agent executor call
    pub executor_timeout: Duration,

    /// Retry budget for steps that do not set their own
    pub default_max_retries: u32,

    /// Artificial latency of the simulated executors
    pub simulated_latency: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("MARKETFLOW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".marketflow")
            });

        let executor_timeout = env_u64("MARKETFLOW_EXECUTOR_TIMEOUT_SECS", 60);
        let default_max_retries = env_u64("MARKETFLOW_MAX_RETRIES", 3) as u32;
        let simulated_latency = env_u64("MARKETFLOW_SIM_LATENCY_MS", 250);

        Self {
            data_dir,
            executor_timeout: Duration::from_secs(executor_timeout),
            default_max_retries,
            simulated_latency: Duration::from_millis(simulated_latency),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("marketflow.db")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            executor_timeout: self.executor_timeout,
            default_max_retries: self.default_max_retries,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
