//! # Execution Metrics
//!
//! Per-task success/failure counters with a bounded window of recent
//! durations. Read-side introspection only: snapshots feed operational
//! tooling and never drive control flow.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

/// Ring-buffer capacity for recent execution durations.
const DURATION_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct TaskMetrics {
    success_count: u64,
    failure_count: u64,
    recent_durations: VecDeque<f64>,
}

impl TaskMetrics {
    fn push_duration(&mut self, duration_seconds: f64) {
        if self.recent_durations.len() == DURATION_WINDOW {
            self.recent_durations.pop_front();
        }
        self.recent_durations.push_back(duration_seconds);
    }
}

/// Aggregated read-only view of one task's execution history.
#[derive(Debug, Clone, Serialize)]
pub struct TaskMetricsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_executions: u64,
    /// 0.0–1.0 over all recorded executions.
    pub success_rate: f64,
    /// Mean over the recent-duration window, 0.0 when empty.
    pub avg_duration_seconds: f64,
    pub circuit_breaker_open: bool,
}

/// Process-lifetime metrics registry, keyed by task name.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    tasks: Mutex<HashMap<String, TaskMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, task_name: &str, duration_seconds: f64) {
        let mut tasks = self.tasks.lock();
        let entry = tasks.entry(task_name.to_string()).or_default();
        entry.success_count += 1;
        entry.push_duration(duration_seconds);
    }

    pub fn record_failure(&self, task_name: &str, duration_seconds: f64) {
        let mut tasks = self.tasks.lock();
        let entry = tasks.entry(task_name.to_string()).or_default();
        entry.failure_count += 1;
        entry.push_duration(duration_seconds);
    }

    /// Snapshot all tasks. `breaker_open` supplies the current breaker state
    /// per task so the registry stays decoupled from the resilience module.
    pub fn snapshot<F>(&self, breaker_open: F) -> HashMap<String, TaskMetricsSnapshot>
    where
        F: Fn(&str) -> bool,
    {
        let tasks = self.tasks.lock();
        tasks
            .iter()
            .map(|(name, metrics)| {
                let total = metrics.success_count + metrics.failure_count;
                let success_rate = if total == 0 {
                    0.0
                } else {
                    metrics.success_count as f64 / total as f64
                };
                let avg_duration_seconds = if metrics.recent_durations.is_empty() {
                    0.0
                } else {
                    metrics.recent_durations.iter().sum::<f64>()
                        / metrics.recent_durations.len() as f64
                };
                (
                    name.clone(),
                    TaskMetricsSnapshot {
                        success_count: metrics.success_count,
                        failure_count: metrics.failure_count,
                        total_executions: total,
                        success_rate,
                        avg_duration_seconds,
                        circuit_breaker_open: breaker_open(name),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_derives_rates_and_averages() {
        let registry = MetricsRegistry::new();
        registry.record_success("dayparting", 2.0);
        registry.record_success("dayparting", 4.0);
        registry.record_failure("dayparting", 6.0);

        let snapshot = registry.snapshot(|_| false);
        let entry = &snapshot["dayparting"];
        assert_eq!(entry.success_count, 2);
        assert_eq!(entry.failure_count, 1);
        assert_eq!(entry.total_executions, 3);
        assert!((entry.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((entry.avg_duration_seconds - 4.0).abs() < 1e-9);
        assert!(!entry.circuit_breaker_open);
    }

    #[test]
    fn duration_window_is_bounded() {
        let registry = MetricsRegistry::new();
        for _ in 0..150 {
            registry.record_success("dayparting", 1.0);
        }
        registry.record_success("dayparting", 101.0);

        let snapshot = registry.snapshot(|_| false);
        let entry = &snapshot["dayparting"];
        assert_eq!(entry.success_count, 151);
        // Window holds the last 100 samples: 99 ones and the 101.0 outlier.
        assert!((entry.avg_duration_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn breaker_flag_comes_from_caller() {
        let registry = MetricsRegistry::new();
        registry.record_failure("dayparting", 1.0);
        registry.record_failure("demographics", 1.0);

        let snapshot = registry.snapshot(|name| name == "dayparting");
        assert!(snapshot["dayparting"].circuit_breaker_open);
        assert!(!snapshot["demographics"].circuit_breaker_open);
    }
}
