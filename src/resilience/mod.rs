//! # Resilience Module
//!
//! Fault isolation for the execution core. The registry keeps one sliding
//! failure window per task name and fails executions fast while a task's
//! breaker is open, so a permanently broken task cannot burn retry budget
//! and API quota on every run.

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry};
