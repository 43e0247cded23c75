//! # Execution Result Model
//!
//! Immutable record of a single execution's disposition. Created exactly
//! once at the end of an execution (success, exhausted-retries failure, or
//! degraded fallback), never mutated afterward, and returned to the caller
//! in place of any error or panic.

use std::path::PathBuf;

use serde::Serialize;

use crate::task::AnalysisReport;

/// Terminal disposition of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Primary execution succeeded and the artifact was written.
    Succeeded,
    /// Primary execution failed; a fallback result was written instead.
    Degraded,
    /// No result could be produced.
    Failed,
}

/// Immutable record of one execution attempt's disposition.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Generated once per execution; tags all related log lines and artifacts.
    pub correlation_id: String,
    pub task_name: String,
    pub subject_id: String,
    pub output_location: Option<PathBuf>,
    pub error_location: Option<PathBuf>,
    pub error_message: Option<String>,
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<AnalysisReport>,
    pub is_fallback: bool,
    pub fallback_reason: Option<String>,
    /// Task invocations made before reaching this disposition.
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn succeeded(
        correlation_id: impl Into<String>,
        task_name: impl Into<String>,
        subject_id: impl Into<String>,
        output_location: PathBuf,
        payload: AnalysisReport,
        duration_seconds: f64,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            correlation_id: correlation_id.into(),
            task_name: task_name.into(),
            subject_id: subject_id.into(),
            output_location: Some(output_location),
            error_location: None,
            error_message: None,
            duration_seconds: Some(duration_seconds),
            payload: Some(payload),
            is_fallback: false,
            fallback_reason: None,
            attempts,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn degraded(
        correlation_id: impl Into<String>,
        task_name: impl Into<String>,
        subject_id: impl Into<String>,
        output_location: PathBuf,
        payload: AnalysisReport,
        fallback_reason: impl Into<String>,
        duration_seconds: f64,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            correlation_id: correlation_id.into(),
            task_name: task_name.into(),
            subject_id: subject_id.into(),
            output_location: Some(output_location),
            error_location: None,
            error_message: None,
            duration_seconds: Some(duration_seconds),
            payload: Some(payload),
            is_fallback: true,
            fallback_reason: Some(fallback_reason.into()),
            attempts,
        }
    }

    pub fn failed(
        correlation_id: impl Into<String>,
        task_name: impl Into<String>,
        subject_id: impl Into<String>,
        error_message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            success: false,
            correlation_id: correlation_id.into(),
            task_name: task_name.into(),
            subject_id: subject_id.into(),
            output_location: None,
            error_location: None,
            error_message: Some(error_message.into()),
            duration_seconds: None,
            payload: None,
            is_fallback: false,
            fallback_reason: None,
            attempts,
        }
    }

    /// Attach the total execution duration during construction.
    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }

    /// Attach the error-artifact path during construction.
    pub fn with_error_location(mut self, error_location: PathBuf) -> Self {
        self.error_location = Some(error_location);
        self
    }

    pub fn outcome(&self) -> Outcome {
        match (self.success, self.is_fallback) {
            (true, false) => Outcome::Succeeded,
            (true, true) => Outcome::Degraded,
            (false, _) => Outcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn outcome_maps_success_and_fallback_flags() {
        let ok = ExecutionResult::succeeded(
            "c1",
            "dayparting",
            "acct-1",
            PathBuf::from("/out/a.json"),
            AnalysisReport::new("dayparting", "acct-1"),
            1.5,
            1,
        );
        assert_eq!(ok.outcome(), Outcome::Succeeded);
        assert!(ok.success);
        assert!(!ok.is_fallback);

        let degraded = ExecutionResult::degraded(
            "c2",
            "dayparting",
            "acct-1",
            PathBuf::from("/out/a.json"),
            AnalysisReport::new("dayparting", "acct-1"),
            "primary execution failed after 3 attempts",
            4.2,
            3,
        );
        assert_eq!(degraded.outcome(), Outcome::Degraded);
        assert!(degraded.fallback_reason.is_some());

        let failed = ExecutionResult::failed("c3", "dayparting", "acct-1", "provider down", 3);
        assert_eq!(failed.outcome(), Outcome::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("provider down"));
    }

    #[test]
    fn failed_result_carries_duration_and_artifact_path() {
        let failed = ExecutionResult::failed("c4", "dayparting", "acct-1", "provider down", 3)
            .with_duration(7.25)
            .with_error_location(PathBuf::from("/out/a_ERROR.json"));

        assert_eq!(failed.duration_seconds, Some(7.25));
        assert_eq!(
            failed.error_location.as_deref(),
            Some(Path::new("/out/a_ERROR.json"))
        );
        assert_eq!(failed.outcome(), Outcome::Failed);
    }
}
