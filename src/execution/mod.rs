//! # Execution Module
//!
//! The orchestrator and its result/metrics models. `ExecutionOrchestrator`
//! coordinates admission control, the retry/timeout loop, validation,
//! durable output, fallback, and metrics; `ExecutionResult` is the immutable
//! record of one execution's disposition.

pub mod metrics;
pub mod orchestrator;
pub mod result;

pub use metrics::{MetricsRegistry, TaskMetricsSnapshot};
pub use orchestrator::ExecutionOrchestrator;
pub use result::{ExecutionResult, Outcome};
