//! # Result Validation
//!
//! Minimal semantic-completeness gate for task results. An empty-but-
//! "successful" run (zero rows because of a provider outage masquerading as
//! success, say) must not be written as a valid artifact; the orchestrator
//! treats a rejection exactly like a failed attempt, so it gets the same
//! retry and fallback treatment.

use crate::task::AnalysisReport;

pub const DEFAULT_MIN_PAYLOAD_BYTES: usize = 50;

/// Checks a task's returned value before it is trusted.
#[derive(Debug, Clone)]
pub struct ResultValidator {
    min_payload_bytes: usize,
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PAYLOAD_BYTES)
    }
}

impl ResultValidator {
    pub fn new(min_payload_bytes: usize) -> Self {
        Self { min_payload_bytes }
    }

    pub fn is_acceptable(&self, report: &AnalysisReport) -> bool {
        self.rejection_reason(report).is_none()
    }

    /// `None` when the report is acceptable, otherwise a human-readable
    /// reason used in log lines and failure messages.
    ///
    /// Acceptable means: both identity fields populated, and at least one of
    /// an actionable finding, a non-trivial metric, or a raw payload whose
    /// serialized size clears the byte threshold.
    pub fn rejection_reason(&self, report: &AnalysisReport) -> Option<String> {
        if report.subject_id.trim().is_empty() {
            return Some("report is missing a subject id".to_string());
        }
        if report.task_name.trim().is_empty() {
            return Some("report is missing a task name".to_string());
        }

        if !report.recommendations.is_empty() {
            return None;
        }
        if report.metrics.values().any(is_non_trivial) {
            return None;
        }
        if let Some(payload) = &report.raw_payload {
            let serialized = serde_json::to_string(payload).unwrap_or_default();
            if serialized.len() > self.min_payload_bytes {
                return None;
            }
        }

        Some(format!(
            "report has no recommendations, no non-trivial metrics, and no raw payload over {} bytes",
            self.min_payload_bytes
        ))
    }
}

/// A metric counts as non-trivial unless it is null, zero, an empty string,
/// or an empty container.
fn is_non_trivial(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(_) => true,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_report() -> AnalysisReport {
        AnalysisReport::new("dayparting", "acct-123")
    }

    #[test]
    fn rejects_missing_identity_fields() {
        let validator = ResultValidator::default();

        let mut report = base_report();
        report.subject_id = "  ".to_string();
        report.recommendations.push(json!({"action": "shift budget"}));
        assert!(!validator.is_acceptable(&report));

        let mut report = base_report();
        report.task_name = String::new();
        report.recommendations.push(json!({"action": "shift budget"}));
        assert!(!validator.is_acceptable(&report));
    }

    #[test]
    fn accepts_report_with_recommendations() {
        let validator = ResultValidator::default();
        let mut report = base_report();
        report
            .recommendations
            .push(json!({"action": "pause keyword", "keyword": "cheap widgets"}));
        assert!(validator.is_acceptable(&report));
    }

    #[test]
    fn accepts_report_with_non_trivial_metrics() {
        let validator = ResultValidator::default();
        let mut report = base_report();
        report.metrics.insert("impressions".into(), json!(15230));
        assert!(validator.is_acceptable(&report));
    }

    #[test]
    fn trivial_metrics_do_not_count() {
        let validator = ResultValidator::default();
        let mut report = base_report();
        report.metrics.insert("impressions".into(), json!(0));
        report.metrics.insert("note".into(), json!(""));
        report.metrics.insert("rows".into(), json!([]));
        assert!(!validator.is_acceptable(&report));
    }

    #[test]
    fn payload_size_threshold_is_exclusive() {
        let validator = ResultValidator::new(50);

        let mut report = base_report();
        report.raw_payload = Some(json!({"a": 1}));
        assert!(!validator.is_acceptable(&report));

        let mut report = base_report();
        report.raw_payload = Some(json!({
            "rows": ["one", "two", "three", "four", "five", "six", "seven"]
        }));
        assert!(validator.is_acceptable(&report));
    }

    #[test]
    fn empty_report_is_rejected_with_reason() {
        let validator = ResultValidator::default();
        let reason = validator.rejection_reason(&base_report());
        assert!(reason.is_some());
        assert!(reason.unwrap().contains("no recommendations"));
    }
}
