//! # Task Boundary
//!
//! Traits and value types at the seam between the orchestrator and the
//! pluggable analysis tasks it runs. The orchestrator never interprets a
//! task's domain result beyond required-field and byte-size checks; tasks
//! never see the orchestrator's internal state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Errors a task (or collaborator) may surface across the boundary.
///
/// The first three variants are external-provider failures and retry on the
/// longer exponential schedule; `Other` covers everything else.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// True for provider/auth/rate-limit failures.
    pub fn is_external(&self) -> bool {
        !matches!(self, TaskError::Other(_))
    }
}

/// Inclusive date range a task analyzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days covered, minimum 1. Used as the default quota estimate.
    pub fn days(&self) -> u64 {
        let delta = (self.end - self.start).num_days() + 1;
        delta.max(1) as u64
    }
}

/// Per-execution task parameters.
///
/// Typed fields cover what the orchestrator itself consults; `extras` carries
/// open-ended task-specific parameters that are validated at the task
/// boundary, not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Quota units this execution is expected to consume. Falls back to a
    /// day-count heuristic when absent.
    pub estimated_quota_units: Option<u64>,

    /// Overrides both the default and the per-task-name configured timeout.
    #[serde(skip)]
    pub timeout_override: Option<Duration>,

    /// Open-ended task-specific parameters.
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

/// Domain result produced by an analysis task.
///
/// Opaque to the orchestrator except for the fields the validator checks and
/// the sections the output writer serializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub task_name: String,
    pub subject_id: String,

    /// Actionable findings, one JSON object per recommendation.
    #[serde(default)]
    pub recommendations: Vec<serde_json::Value>,

    /// Summary metrics computed by the task.
    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,

    /// Raw provider payload, kept for downstream tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,

    /// Non-fatal issues the task encountered while producing the report.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl AnalysisReport {
    pub fn new(task_name: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            subject_id: subject_id.into(),
            ..Self::default()
        }
    }
}

/// A named, independently pluggable analysis task.
///
/// Implementations are pure functions from (subject, time range, options) to
/// a domain result; they hold no orchestrator state and are safe to invoke
/// concurrently for different subjects.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        subject_id: &str,
        time_range: &TimeRange,
        options: &TaskOptions,
    ) -> Result<AnalysisReport, TaskError>;
}

/// Best-effort substitute results for permanently failing tasks.
#[async_trait]
pub trait FallbackProvider: Send + Sync {
    async fn produce_fallback(
        &self,
        task_name: &str,
        subject_id: &str,
        time_range: &TimeRange,
        original_error: &str,
    ) -> Result<AnalysisReport, TaskError>;
}

/// Post-success result cache. Called only after a true success; failures are
/// logged by the orchestrator and otherwise ignored.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn cache_success(
        &self,
        task_name: &str,
        subject_id: &str,
        report: &AnalysisReport,
    ) -> Result<(), TaskError>;
}
