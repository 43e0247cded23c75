//! # Durable Output Writer
//!
//! Persists validated results with a write-to-temp / verify / atomic-rename
//! sequence. The destination path never observably contains a partially
//! written or zero-length file: it is either absent, the previous version,
//! or a fully verified new version. Temp siblings are removed on every
//! failure path by an RAII guard that also runs during panic unwind.
//!
//! Terminal failures get their own `_ERROR` sibling artifact so a reader can
//! always tell a real report from a failure record by filename and by the
//! envelope's `success` field.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ExecutorError, Result};
use crate::task::AnalysisReport;

pub const DEFAULT_MIN_OUTPUT_BYTES: u64 = 100;

/// Writer thresholds.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Smallest envelope the writer will accept as a real artifact.
    pub min_output_bytes: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            min_output_bytes: DEFAULT_MIN_OUTPUT_BYTES,
        }
    }
}

/// Execution envelope metadata attached to every artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetadata {
    pub correlation_id: String,
    pub task_name: String,
    pub subject_id: String,
    pub generated_at: DateTime<Utc>,
    pub success: bool,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
struct OutputEnvelope<'a> {
    execution_metadata: &'a ExecutionMetadata,
    metrics: &'a serde_json::Map<String, serde_json::Value>,
    recommendations: &'a [serde_json::Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a serde_json::Value>,
    errors: &'a [String],
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    execution_metadata: &'a ExecutionMetadata,
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    message: &'a str,
    attempts: u32,
}

/// Removes the temp file unless disarmed. Primary cleanup mechanism; runs on
/// every early return and on panic unwind.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to clean up temp file");
                }
            }
        }
    }
}

/// Durable, atomic result persistence.
#[derive(Debug, Clone, Default)]
pub struct OutputWriter {
    config: OutputConfig,
}

impl OutputWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Serialize `report` under `meta` to a temp sibling, verify its size and
    /// envelope, then atomically rename it over `destination`.
    pub async fn write_validated(
        &self,
        report: &AnalysisReport,
        meta: &ExecutionMetadata,
        destination: &Path,
    ) -> Result<PathBuf> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence("creating output directory", &e))?;
        }

        let envelope = OutputEnvelope {
            execution_metadata: meta,
            metrics: &report.metrics,
            recommendations: &report.recommendations,
            payload: report.raw_payload.as_ref(),
            errors: &report.errors,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| persistence("serializing output envelope", &e))?;

        let temp_path = temp_sibling(destination, &meta.correlation_id);
        let mut guard = TempGuard::new(temp_path.clone());

        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| persistence("writing temp file", &e))?;

        self.verify_temp(&temp_path).await?;

        tokio::fs::rename(&temp_path, destination)
            .await
            .map_err(|e| persistence("renaming temp file over destination", &e))?;
        guard.disarm();

        info!(
            correlation_id = %meta.correlation_id,
            task = %meta.task_name,
            subject = %meta.subject_id,
            path = %destination.display(),
            bytes = bytes.len(),
            is_fallback = meta.is_fallback,
            "Output written"
        );
        Ok(destination.to_path_buf())
    }

    /// Size-check the temp file and re-parse it to confirm the envelope's
    /// success flag survived serialization intact.
    async fn verify_temp(&self, temp_path: &Path) -> Result<()> {
        let metadata = tokio::fs::metadata(temp_path)
            .await
            .map_err(|e| persistence("reading temp file metadata", &e))?;
        if metadata.len() < self.config.min_output_bytes {
            return Err(ExecutorError::Persistence(format!(
                "output file is {} bytes, below the {}-byte minimum",
                metadata.len(),
                self.config.min_output_bytes
            )));
        }

        let contents = tokio::fs::read(temp_path)
            .await
            .map_err(|e| persistence("re-reading temp file", &e))?;
        let parsed: serde_json::Value = serde_json::from_slice(&contents)
            .map_err(|e| persistence("re-parsing temp file", &e))?;
        match parsed["execution_metadata"]["success"].as_bool() {
            Some(true) => Ok(()),
            _ => Err(ExecutorError::Persistence(
                "written envelope does not carry success=true".to_string(),
            )),
        }
    }

    /// Write a terminal-failure artifact next to the main destination and
    /// remove any pre-existing zero-length file at the destination itself.
    /// Never overwrites the main destination.
    pub async fn write_error(
        &self,
        task_name: &str,
        subject_id: &str,
        correlation_id: &str,
        cause: &str,
        attempts: u32,
        destination: &Path,
    ) -> Result<PathBuf> {
        if let Ok(metadata) = tokio::fs::metadata(destination).await {
            if metadata.is_file() && metadata.len() == 0 {
                debug!(path = %destination.display(), "Removing zero-length destination file");
                let _ = tokio::fs::remove_file(destination).await;
            }
        }

        let error_path = error_artifact_path(destination);
        if let Some(parent) = error_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence("creating output directory", &e))?;
        }

        let meta = ExecutionMetadata {
            correlation_id: correlation_id.to_string(),
            task_name: task_name.to_string(),
            subject_id: subject_id.to_string(),
            generated_at: Utc::now(),
            success: false,
            is_fallback: false,
            fallback_reason: None,
            attempts,
        };
        let envelope = ErrorEnvelope {
            execution_metadata: &meta,
            error: ErrorDetail {
                message: cause,
                attempts,
            },
        };
        let bytes = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| persistence("serializing error envelope", &e))?;

        tokio::fs::write(&error_path, &bytes)
            .await
            .map_err(|e| persistence("writing error artifact", &e))?;

        warn!(
            correlation_id = %correlation_id,
            task = %task_name,
            subject = %subject_id,
            path = %error_path.display(),
            "Error artifact written"
        );
        Ok(error_path)
    }
}

fn persistence(stage: &str, error: &dyn std::fmt::Display) -> ExecutorError {
    ExecutorError::Persistence(format!("{stage}: {error}"))
}

fn temp_sibling(destination: &Path, correlation_id: &str) -> PathBuf {
    let file_name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    destination.with_file_name(format!("{file_name}.{correlation_id}.tmp"))
}

/// `reports/dayparting_acct1.json` -> `reports/dayparting_acct1_ERROR.json`
fn error_artifact_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    match destination.extension().and_then(|e| e.to_str()) {
        Some(ext) => destination.with_file_name(format!("{stem}_ERROR.{ext}")),
        None => destination.with_file_name(format!("{stem}_ERROR")),
    }
}
