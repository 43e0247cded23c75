//! # Execution Orchestrator
//!
//! Top-level coordinator for analysis-task execution. Each execution walks
//! one state machine: breaker/quota admission, then an attempt loop that
//! runs the task under a deadline, classifies failures, and backs off
//! between retries; a validated success is durably written and cached; an
//! exhausted task falls back to the degradation collaborator or produces an
//! error artifact. Callers always receive an `ExecutionResult`; no task,
//! collaborator, or persistence failure ever escapes as an error or panic.
//!
//! `execute_many` fans executions out through a semaphore-bounded worker
//! pool so a batch never overloads the rate-limited external dependency.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, FailureClass, Result};
use crate::execution::metrics::{MetricsRegistry, TaskMetricsSnapshot};
use crate::execution::result::ExecutionResult;
use crate::output::{ExecutionMetadata, OutputConfig, OutputWriter};
use crate::quota::{QuotaConfig, QuotaManager, QuotaStatus};
use crate::resilience::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::task::{
    AnalysisReport, AnalysisTask, FallbackProvider, ResultCache, TaskError, TaskOptions, TimeRange,
};
use crate::validation::ResultValidator;

/// Coordinates admission control, retries, validation, persistence,
/// fallback, and metrics for analysis-task execution.
///
/// Cheap to clone: all mutable state lives behind shared registries, so a
/// clone observes the same breakers, quota, and metrics.
#[derive(Clone)]
pub struct ExecutionOrchestrator {
    config: Arc<ExecutorConfig>,
    breaker: Arc<CircuitBreakerRegistry>,
    quota: Arc<QuotaManager>,
    metrics: Arc<MetricsRegistry>,
    validator: ResultValidator,
    writer: OutputWriter,
    fallback: Option<Arc<dyn FallbackProvider>>,
    cache: Option<Arc<dyn ResultCache>>,
}

impl ExecutionOrchestrator {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;

        let breaker = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            cooldown: Duration::from_secs(config.circuit_breaker.cooldown_seconds),
            window: Duration::from_secs(config.circuit_breaker.window_seconds),
        });
        let quota = QuotaManager::new(QuotaConfig {
            daily_limit: config.quota.daily_limit,
            minute_limit: config.quota.minute_limit,
        });
        let validator = ResultValidator::new(config.validation.min_payload_bytes);
        let writer = OutputWriter::new(OutputConfig {
            min_output_bytes: config.output.min_output_bytes,
        });

        info!(
            max_retries = config.max_retries,
            timeout_seconds = config.timeout_seconds,
            concurrency_limit = config.concurrency_limit,
            breaker_threshold = config.circuit_breaker.failure_threshold,
            daily_quota = config.quota.daily_limit,
            "Execution orchestrator initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            breaker: Arc::new(breaker),
            quota: Arc::new(quota),
            metrics: Arc::new(MetricsRegistry::new()),
            validator,
            writer,
            fallback: None,
            cache: None,
        })
    }

    /// Attach the degradation collaborator consulted after retry exhaustion.
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Attach the best-effort result cache consulted after true successes.
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run one task to a terminal disposition. Never returns an error and
    /// never panics; every outcome is folded into the `ExecutionResult`.
    pub async fn execute(
        &self,
        task: Arc<dyn AnalysisTask>,
        subject_id: &str,
        time_range: &TimeRange,
        destination: &Path,
        options: &TaskOptions,
    ) -> ExecutionResult {
        let correlation_id = Uuid::new_v4().to_string();
        let task_name = task.name().to_string();
        let started = Instant::now();

        debug!(
            correlation_id = %correlation_id,
            task = %task_name,
            subject = %subject_id,
            "Execution starting"
        );

        // Admission: breaker first, then quota. A fail-fast here is not a new
        // failure for the breaker.
        if self.breaker.is_open(&task_name) {
            let cause = ExecutorError::CircuitOpen {
                task: task_name.clone(),
            };
            warn!(
                correlation_id = %correlation_id,
                task = %task_name,
                "Admission denied: circuit breaker open"
            );
            return ExecutionResult::failed(
                correlation_id,
                task_name,
                subject_id,
                cause.to_string(),
                0,
            );
        }

        let units = options
            .estimated_quota_units
            .unwrap_or_else(|| time_range.days());
        if !self.quota.check_available(units) {
            let cause = ExecutorError::QuotaExhausted(format!(
                "{units} estimated units unavailable for task '{task_name}'"
            ));
            warn!(
                correlation_id = %correlation_id,
                task = %task_name,
                estimated_units = units,
                "Admission denied: quota exhausted"
            );
            return ExecutionResult::failed(
                correlation_id,
                task_name,
                subject_id,
                cause.to_string(),
                0,
            );
        }

        let deadline = options
            .timeout_override
            .unwrap_or_else(|| self.config.timeout_for(&task_name));
        let max_retries = self.config.max_retries;
        let mut last_error = ExecutorError::Unexpected("no attempts were made".to_string());

        for attempt in 1..=max_retries {
            let attempt_result = self
                .run_attempt(
                    task.as_ref(),
                    &correlation_id,
                    subject_id,
                    time_range,
                    options,
                    deadline,
                    units,
                    destination,
                    attempt,
                )
                .await;

            match attempt_result {
                Ok((report, output_path)) => {
                    let duration = started.elapsed().as_secs_f64();
                    self.metrics.record_success(&task_name, duration);
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.cache_success(&task_name, subject_id, &report).await {
                            warn!(
                                correlation_id = %correlation_id,
                                task = %task_name,
                                error = %e,
                                "Result cache write failed; continuing"
                            );
                        }
                    }
                    info!(
                        correlation_id = %correlation_id,
                        task = %task_name,
                        subject = %subject_id,
                        attempt,
                        duration_seconds = duration,
                        "🟢 Execution succeeded"
                    );
                    return ExecutionResult::succeeded(
                        correlation_id,
                        task_name,
                        subject_id,
                        output_path,
                        report,
                        duration,
                        attempt,
                    );
                }
                Err(attempt_error) => {
                    let class = FailureClass::classify(&attempt_error);
                    warn!(
                        correlation_id = %correlation_id,
                        task = %task_name,
                        attempt,
                        max_retries,
                        class = ?class,
                        error = %attempt_error,
                        "Attempt failed"
                    );
                    if attempt < max_retries {
                        let delay = class.backoff_delay(
                            attempt,
                            self.config.retry_delay_base_seconds,
                            self.config.retry_delay_max_seconds,
                        );
                        if !delay.is_zero() {
                            debug!(
                                correlation_id = %correlation_id,
                                task = %task_name,
                                delay_ms = delay.as_millis() as u64,
                                "Backing off before retry"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                    last_error = attempt_error;
                }
            }
        }

        // Exhausted: this is the one place a terminal failure feeds the
        // breaker and the failure metrics.
        self.breaker.record_failure(&task_name);
        self.metrics
            .record_failure(&task_name, started.elapsed().as_secs_f64());
        error!(
            correlation_id = %correlation_id,
            task = %task_name,
            subject = %subject_id,
            attempts = max_retries,
            error = %last_error,
            "🔴 Execution failed after all attempts"
        );

        if let Some(fallback) = &self.fallback {
            match fallback
                .produce_fallback(&task_name, subject_id, time_range, &last_error.to_string())
                .await
            {
                Ok(report) => {
                    let reason = format!(
                        "primary execution failed after {max_retries} attempts: {last_error}"
                    );
                    let meta = ExecutionMetadata {
                        correlation_id: correlation_id.clone(),
                        task_name: task_name.clone(),
                        subject_id: subject_id.to_string(),
                        generated_at: Utc::now(),
                        success: true,
                        is_fallback: true,
                        fallback_reason: Some(reason.clone()),
                        attempts: max_retries,
                    };
                    match self.writer.write_validated(&report, &meta, destination).await {
                        Ok(output_path) => {
                            info!(
                                correlation_id = %correlation_id,
                                task = %task_name,
                                subject = %subject_id,
                                "🟡 Degraded result written from fallback"
                            );
                            return ExecutionResult::degraded(
                                correlation_id,
                                task_name,
                                subject_id,
                                output_path,
                                report,
                                reason,
                                started.elapsed().as_secs_f64(),
                                max_retries,
                            );
                        }
                        Err(write_error) => warn!(
                            correlation_id = %correlation_id,
                            task = %task_name,
                            error = %write_error,
                            "Fallback result could not be written"
                        ),
                    }
                }
                Err(fallback_error) => warn!(
                    correlation_id = %correlation_id,
                    task = %task_name,
                    error = %fallback_error,
                    "Fallback provider failed"
                ),
            }
        }

        let message =
            format!("task '{task_name}' failed after {max_retries} attempts: {last_error}");
        let result = ExecutionResult::failed(
            correlation_id.clone(),
            task_name.clone(),
            subject_id,
            message.clone(),
            max_retries,
        )
        .with_duration(started.elapsed().as_secs_f64());

        // A failed error-artifact write is logged only; the caller is still
        // told the task failed.
        match self
            .writer
            .write_error(
                &task_name,
                subject_id,
                &correlation_id,
                &message,
                max_retries,
                destination,
            )
            .await
        {
            Ok(error_path) => result.with_error_location(error_path),
            Err(write_error) => {
                warn!(
                    correlation_id = %correlation_id,
                    task = %task_name,
                    error = %write_error,
                    "Error artifact could not be written"
                );
                result
            }
        }
    }

    /// One invocation under deadline: run, reserve quota, classify, validate,
    /// record breaker success, persist. Any `Err` is a retryable attempt
    /// failure for the loop in `execute`.
    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        task: &dyn AnalysisTask,
        correlation_id: &str,
        subject_id: &str,
        time_range: &TimeRange,
        options: &TaskOptions,
        deadline: Duration,
        units: u64,
        destination: &Path,
        attempt: u32,
    ) -> Result<(AnalysisReport, PathBuf)> {
        let invocation = AssertUnwindSafe(task.run(subject_id, time_range, options)).catch_unwind();
        let outcome = tokio::time::timeout(deadline, invocation).await;

        // The external call consumed budget whether or not it succeeded.
        self.quota.reserve(units);

        let report = match outcome {
            Err(_elapsed) => return Err(ExecutorError::Timeout(deadline)),
            Ok(Err(_panic)) => {
                return Err(ExecutorError::Unexpected(format!(
                    "task '{}' panicked during invocation",
                    task.name()
                )))
            }
            Ok(Ok(Err(task_error))) => return Err(classify_task_error(task_error)),
            Ok(Ok(Ok(report))) => report,
        };

        if let Some(reason) = self.validator.rejection_reason(&report) {
            return Err(ExecutorError::ValidationRejected(reason));
        }

        // True success: fast breaker recovery before persistence, so a flaky
        // disk does not keep a healthy task's breaker primed.
        self.breaker.record_success(task.name());

        let meta = ExecutionMetadata {
            correlation_id: correlation_id.to_string(),
            task_name: task.name().to_string(),
            subject_id: subject_id.to_string(),
            generated_at: Utc::now(),
            success: true,
            is_fallback: false,
            fallback_reason: None,
            attempts: attempt,
        };
        let output_path = self.writer.write_validated(&report, &meta, destination).await?;
        Ok((report, output_path))
    }

    /// Run every task against one subject through a bounded worker pool.
    ///
    /// The returned vector matches the input order. A spawned execution that
    /// crashes outside the `execute` contract is converted into a `Failed`
    /// result rather than aborting the batch.
    pub async fn execute_many(
        &self,
        tasks: Vec<Arc<dyn AnalysisTask>>,
        subject_id: &str,
        time_range: &TimeRange,
        destination_dir: &Path,
        concurrency_limit: Option<usize>,
    ) -> Vec<ExecutionResult> {
        let limit = concurrency_limit
            .unwrap_or(self.config.concurrency_limit)
            .max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        info!(
            task_count = tasks.len(),
            concurrency_limit = limit,
            subject = %subject_id,
            "Fan-out execution starting"
        );

        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let orchestrator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let subject = subject_id.to_string();
            let time_range = *time_range;
            let task_name = task.name().to_string();
            let destination = destination_dir.join(format!("{}_{}.json", task.name(), subject_id));

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ExecutionResult::failed(
                            Uuid::new_v4().to_string(),
                            task.name().to_string(),
                            subject,
                            "worker pool closed before execution",
                            0,
                        )
                    }
                };
                orchestrator
                    .execute(
                        task,
                        &subject,
                        &time_range,
                        &destination,
                        &TaskOptions::default(),
                    )
                    .await
            });
            handles.push((task_name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (task_name, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    error!(
                        task = %task_name,
                        subject = %subject_id,
                        error = %join_error,
                        "Execution crashed; converting to failed result"
                    );
                    results.push(ExecutionResult::failed(
                        Uuid::new_v4().to_string(),
                        task_name,
                        subject_id,
                        format!("execution crashed: {join_error}"),
                        0,
                    ));
                }
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            task_count = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            subject = %subject_id,
            "Fan-out execution finished"
        );
        results
    }

    /// Per-task execution metrics merged with current breaker state.
    /// Read-only; polled by operational tooling.
    pub fn metrics(&self) -> std::collections::HashMap<String, TaskMetricsSnapshot> {
        self.metrics.snapshot(|task_name| self.breaker.is_open(task_name))
    }

    /// Current quota consumption snapshot.
    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.status()
    }

    /// Per-task circuit breaker snapshot.
    pub fn breaker_snapshot(&self) -> std::collections::HashMap<String, BreakerSnapshot> {
        self.breaker.snapshot()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl std::fmt::Debug for ExecutionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOrchestrator")
            .field("config", &self.config)
            .field("has_fallback", &self.fallback.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}

/// Provider/auth/rate-limit task errors retry on the external schedule;
/// everything else is the unexpected class.
fn classify_task_error(error: TaskError) -> ExecutorError {
    if error.is_external() {
        ExecutorError::Provider(error.to_string())
    } else {
        ExecutorError::Unexpected(error.to_string())
    }
}
