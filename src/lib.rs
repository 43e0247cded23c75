#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Analyzer Core
//!
//! Resilient execution core for pluggable analysis tasks that run against an
//! external, rate-limited, unreliable API.
//!
//! ## Overview
//!
//! The orchestrator guarantees bounded concurrency, automatic retry with
//! backoff, per-task circuit breaking, daily/per-minute quota admission
//! control, validated and durably-written output, and fallback to previously
//! cached results when a task is permanently failing. Callers always receive
//! an [`ExecutionResult`](execution::ExecutionResult); no task or
//! collaborator failure ever surfaces as an error or panic.
//!
//! ## Module Organization
//!
//! - [`execution`] - Orchestrator, execution results, metrics
//! - [`resilience`] - Per-task circuit breaker registry
//! - [`quota`] - Daily/per-minute quota admission control
//! - [`validation`] - Semantic-completeness gate for task results
//! - [`output`] - Atomic, verified artifact persistence
//! - [`task`] - Task, fallback, and cache trait boundary
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use analyzer_core::config::ExecutorConfig;
//! use analyzer_core::execution::ExecutionOrchestrator;
//! use analyzer_core::task::{AnalysisTask, TaskOptions, TimeRange};
//! use chrono::NaiveDate;
//!
//! # async fn example(task: Arc<dyn AnalysisTask>) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = ExecutionOrchestrator::new(ExecutorConfig::default())?;
//! let range = TimeRange::new(
//!     NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
//! );
//!
//! let result = orchestrator
//!     .execute(
//!         task,
//!         "acct-123",
//!         &range,
//!         Path::new("reports/dayparting_acct-123.json"),
//!         &TaskOptions::default(),
//!     )
//!     .await;
//!
//! println!("{}: success={}", result.task_name, result.success);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod output;
pub mod quota;
pub mod resilience;
pub mod task;
pub mod validation;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, FailureClass, Result};
pub use execution::{ExecutionOrchestrator, ExecutionResult, MetricsRegistry, Outcome, TaskMetricsSnapshot};
pub use output::{ExecutionMetadata, OutputWriter};
pub use quota::{QuotaManager, QuotaStatus};
pub use resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
pub use task::{
    AnalysisReport, AnalysisTask, FallbackProvider, ResultCache, TaskError, TaskOptions, TimeRange,
};
pub use validation::ResultValidator;
