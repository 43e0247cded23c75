//! # Structured Error Handling
//!
//! Error taxonomy for the execution core. Every failure an execution attempt
//! can hit maps onto one of these variants, and every variant maps onto a
//! retry class with its own backoff schedule. Callers of the orchestrator
//! never see these directly; they are folded into `ExecutionResult`.

use std::time::Duration;

/// Errors raised inside the execution core.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Admission denied: the circuit breaker for this task is open.
    #[error("circuit breaker is open for task '{task}'")]
    CircuitOpen { task: String },

    /// Admission denied: reserving the estimated units would exceed a quota window.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// The task invocation exceeded its deadline.
    #[error("task timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The external provider failed (API, auth, or rate-limit error).
    #[error("provider error: {0}")]
    Provider(String),

    /// A "successful" task returned a payload too thin to trust.
    #[error("result rejected by validator: {0}")]
    ValidationRejected(String),

    /// The write/validate/rename persistence sequence failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else: programming or data errors, task panics.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Retry class assigned to a failed attempt.
///
/// External failures (provider/auth/rate-limit) and timeouts back off
/// exponentially; unexpected failures (including validator rejections and
/// persistence errors) back off linearly with a tighter cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Timeout,
    External,
    Unexpected,
}

impl FailureClass {
    pub fn classify(error: &ExecutorError) -> Self {
        match error {
            ExecutorError::Timeout(_) => FailureClass::Timeout,
            ExecutorError::Provider(_) => FailureClass::External,
            _ => FailureClass::Unexpected,
        }
    }

    /// Delay to sleep before the next attempt. `attempt` is 1-based.
    pub fn backoff_delay(self, attempt: u32, base_seconds: f64, max_seconds: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let seconds = match self {
            FailureClass::Timeout | FailureClass::External => {
                (base_seconds * 2f64.powi(exponent as i32)).min(max_seconds)
            }
            FailureClass::Unexpected => (base_seconds * f64::from(attempt)).min(max_seconds / 2.0),
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }
}
