//! # Circuit Breaker Registry
//!
//! Per-task-name sliding-window failure counting with a cooldown-based open
//! state. Unlike the classic three-state breaker there is no half-open probe
//! phase: recovery is optimistic. Once the cooldown elapses the breaker is
//! considered closed without an explicit reset, and a single successful
//! execution clears the failure history entirely. The orchestrator already
//! serializes retries with backoff before the breaker is consulted again, so
//! a probe phase would add states without adding protection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

/// Circuit breaker thresholds and windows.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Windowed failure count that opens the breaker.
    pub failure_threshold: usize,
    /// How long an open breaker rejects executions.
    pub cooldown: Duration,
    /// Sliding window over which failures are counted.
    pub window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
            window: Duration::from_secs(3600),
        }
    }
}

/// Mutable per-task breaker state. A breaker is open iff `opened_at` is set
/// and younger than the cooldown.
#[derive(Debug, Default)]
struct CircuitState {
    recent_failures: Vec<Instant>,
    opened_at: Option<Instant>,
}

/// Read-only view of one task's breaker, for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub recent_failures: usize,
    pub open: bool,
    pub seconds_until_close: Option<u64>,
}

/// Process-lifetime registry of per-task circuit breakers.
///
/// All methods take `&self`; state lives behind a single mutex whose critical
/// sections are map lookups and vector pruning, never held across an await.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// True iff the task's open-state timer has not yet elapsed.
    pub fn is_open(&self, task_name: &str) -> bool {
        let states = self.states.lock();
        match states.get(task_name).and_then(|s| s.opened_at) {
            Some(opened_at) => opened_at.elapsed() < self.config.cooldown,
            None => false,
        }
    }

    /// Record one terminal failure for the task. Opens the breaker when the
    /// windowed count reaches the threshold. Side effect only; never errors.
    pub fn record_failure(&self, task_name: &str) {
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = states.entry(task_name.to_string()).or_default();

        state.recent_failures.push(now);
        let window = self.config.window;
        state.recent_failures.retain(|t| now.duration_since(*t) < window);

        if state.recent_failures.len() >= self.config.failure_threshold {
            let reopened = state.opened_at.is_some();
            state.opened_at = Some(now);
            if !reopened {
                error!(
                    task = %task_name,
                    windowed_failures = state.recent_failures.len(),
                    failure_threshold = self.config.failure_threshold,
                    cooldown_seconds = self.config.cooldown.as_secs(),
                    "🔴 Circuit breaker opened (failing fast)"
                );
            }
        } else {
            debug!(
                task = %task_name,
                windowed_failures = state.recent_failures.len(),
                failure_threshold = self.config.failure_threshold,
                "Failure recorded for circuit breaker"
            );
        }
    }

    /// Record a successful execution: clears failure history and any open
    /// timer for the task (fast recovery).
    pub fn record_success(&self, task_name: &str) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(task_name) {
            let was_open = state.opened_at.is_some();
            state.recent_failures.clear();
            state.opened_at = None;
            if was_open {
                info!(task = %task_name, "🟢 Circuit breaker closed (recovered)");
            }
        }
    }

    /// Per-task snapshot for operational tooling.
    pub fn snapshot(&self) -> HashMap<String, BreakerSnapshot> {
        let states = self.states.lock();
        states
            .iter()
            .map(|(name, state)| {
                let remaining = state.opened_at.and_then(|opened_at| {
                    self.config.cooldown.checked_sub(opened_at.elapsed())
                });
                (
                    name.clone(),
                    BreakerSnapshot {
                        recent_failures: state.recent_failures.len(),
                        open: remaining.is_some(),
                        seconds_until_close: remaining.map(|d| d.as_secs()),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn registry(threshold: usize, cooldown_ms: u64, window_ms: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
            window: Duration::from_millis(window_ms),
        })
    }

    #[test]
    fn closed_until_threshold_reached() {
        let registry = registry(3, 10_000, 60_000);

        registry.record_failure("dayparting");
        registry.record_failure("dayparting");
        assert!(!registry.is_open("dayparting"));

        registry.record_failure("dayparting");
        assert!(registry.is_open("dayparting"));
    }

    #[test]
    fn tasks_are_independent() {
        let registry = registry(2, 10_000, 60_000);

        registry.record_failure("dayparting");
        registry.record_failure("dayparting");
        assert!(registry.is_open("dayparting"));
        assert!(!registry.is_open("demographics"));
    }

    #[test]
    fn cooldown_elapse_closes_without_reset() {
        let registry = registry(1, 30, 60_000);

        registry.record_failure("dayparting");
        assert!(registry.is_open("dayparting"));

        sleep(Duration::from_millis(40));
        assert!(!registry.is_open("dayparting"));
    }

    #[test]
    fn success_clears_history_and_timer() {
        let registry = registry(2, 10_000, 60_000);

        registry.record_failure("dayparting");
        registry.record_failure("dayparting");
        assert!(registry.is_open("dayparting"));

        registry.record_success("dayparting");
        assert!(!registry.is_open("dayparting"));

        // History was cleared, so a single new failure stays under threshold.
        registry.record_failure("dayparting");
        assert!(!registry.is_open("dayparting"));
    }

    #[test]
    fn window_prunes_old_failures() {
        let registry = registry(2, 10_000, 30);

        registry.record_failure("dayparting");
        sleep(Duration::from_millis(40));

        // First failure aged out of the window; count restarts at 1.
        registry.record_failure("dayparting");
        assert!(!registry.is_open("dayparting"));
    }

    #[test]
    fn snapshot_reports_open_state() {
        let registry = registry(1, 10_000, 60_000);
        registry.record_failure("dayparting");

        let snapshot = registry.snapshot();
        let entry = &snapshot["dayparting"];
        assert!(entry.open);
        assert_eq!(entry.recent_failures, 1);
        assert!(entry.seconds_until_close.is_some());
    }
}
