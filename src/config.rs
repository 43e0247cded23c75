//! # Configuration Management
//!
//! Executor configuration with defaults matching production behavior, plus
//! loading from TOML files and `ANALYZER_`-prefixed environment variables.
//! Nested sections mirror the components they configure; `validate()` runs
//! after any load and before the orchestrator is constructed.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, Result};
use crate::output::DEFAULT_MIN_OUTPUT_BYTES;
use crate::validation::DEFAULT_MIN_PAYLOAD_BYTES;

/// Top-level executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum task invocations per execution.
    pub max_retries: u32,

    /// Default per-attempt deadline in seconds.
    pub timeout_seconds: u64,

    /// Per-task-name deadline overrides in seconds.
    pub task_timeout_overrides: HashMap<String, u64>,

    /// Base delay for retry backoff.
    pub retry_delay_base_seconds: f64,

    /// Cap for retry backoff (unexpected-class failures cap at half this).
    pub retry_delay_max_seconds: f64,

    /// Worker-pool size for `execute_many`.
    pub concurrency_limit: usize,

    pub circuit_breaker: CircuitBreakerSettings,
    pub quota: QuotaSettings,
    pub validation: ValidationSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: usize,
    pub cooldown_seconds: u64,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub daily_limit: u64,
    pub minute_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub min_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub min_output_bytes: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_seconds: 120,
            task_timeout_overrides: HashMap::new(),
            retry_delay_base_seconds: 2.0,
            retry_delay_max_seconds: 60.0,
            concurrency_limit: 3,
            circuit_breaker: CircuitBreakerSettings::default(),
            quota: QuotaSettings::default(),
            validation: ValidationSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 300,
            window_seconds: 3600,
        }
    }
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            daily_limit: 10_000,
            minute_limit: 100,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_payload_bytes: DEFAULT_MIN_PAYLOAD_BYTES,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            min_output_bytes: DEFAULT_MIN_OUTPUT_BYTES,
        }
    }
}

impl ExecutorConfig {
    /// Load from an optional TOML file with `ANALYZER_`-prefixed environment
    /// overrides (`ANALYZER_QUOTA__DAILY_LIMIT=5000` targets
    /// `quota.daily_limit`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ANALYZER")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: ExecutorConfig = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ExecutorError::Configuration(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load(Some(path))
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ExecutorError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(ExecutorError::Configuration(
                "timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(ExecutorError::Configuration(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.retry_delay_base_seconds < 0.0 || self.retry_delay_max_seconds < 0.0 {
            return Err(ExecutorError::Configuration(
                "retry delays must be non-negative".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ExecutorError::Configuration(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.quota.daily_limit == 0 || self.quota.minute_limit == 0 {
            return Err(ExecutorError::Configuration(
                "quota limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Deadline for one invocation of `task_name`, honoring overrides.
    pub fn timeout_for(&self, task_name: &str) -> Duration {
        let seconds = self
            .task_timeout_overrides
            .get(task_name)
            .copied()
            .unwrap_or(self.timeout_seconds);
        Duration::from_secs(seconds)
    }
}
