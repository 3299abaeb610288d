//! Security scanning pipeline applied to tool inputs and, for synthesis
//! output, RAG answers before they leave the process.
//!
//! A scan never silently drops what it flags: depending on [`SanitizeMode`]
//! it either strips the offending substring, neutralizes it in place (HTML
//! escape plus defusing the token that tripped the pattern), or rejects the
//! whole input outright. Critical-severity findings always reject,
//! regardless of the configured mode.

use crate::config::SanitizeMode;
use crate::SpiralError;
use html_escape::encode_text;
use regex::Regex;
use serde::Serialize;

pub const MAX_TASK_CONTENT_LENGTH: usize = 10_000;
pub const MAX_CONTEXT_KEY_LENGTH: usize = crate::constants::MAX_CONTEXT_KEY_LENGTH;
pub const MAX_CONTEXT_VALUE_LENGTH: usize = crate::constants::MAX_CONTEXT_VALUE_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

struct Pattern {
    needle: &'static str,
    severity: Severity,
    label: &'static str,
}

/// Denylist of known attack vectors, grouped by the OWASP category they
/// represent. Extending this list is the open/closed extension point for
/// the pipeline -- no caller-facing code needs to change.
static DENYLIST: &[Pattern] = &[
    Pattern { needle: "<script", severity: Severity::Critical, label: "script_tag" },
    Pattern { needle: "javascript:", severity: Severity::High, label: "javascript_url" },
    Pattern { needle: "data:text/html", severity: Severity::High, label: "data_url_html" },
    Pattern { needle: "vbscript:", severity: Severity::High, label: "vbscript_url" },
    Pattern { needle: "onerror=", severity: Severity::High, label: "event_handler_injection" },
    Pattern { needle: "&&", severity: Severity::Medium, label: "shell_chain" },
    Pattern { needle: "||", severity: Severity::Medium, label: "shell_chain" },
    Pattern { needle: ";rm ", severity: Severity::Critical, label: "shell_rm" },
    Pattern { needle: "`rm ", severity: Severity::Critical, label: "shell_rm" },
    Pattern { needle: "$(rm", severity: Severity::Critical, label: "shell_rm" },
    Pattern { needle: "';", severity: Severity::High, label: "sql_termination" },
    Pattern { needle: "union select", severity: Severity::High, label: "sql_union" },
    Pattern { needle: "drop table", severity: Severity::Critical, label: "sql_drop" },
    Pattern { needle: "delete from", severity: Severity::High, label: "sql_delete" },
    Pattern { needle: "../", severity: Severity::Medium, label: "path_traversal" },
    Pattern { needle: "..\\", severity: Severity::Medium, label: "path_traversal" },
    Pattern { needle: "/etc/passwd", severity: Severity::Critical, label: "sensitive_file" },
    Pattern { needle: "/etc/shadow", severity: Severity::Critical, label: "sensitive_file" },
    Pattern { needle: "file://", severity: Severity::Medium, label: "file_protocol" },
];

/// Allowlist for names treated as identifiers (context keys, tags).
static SAFE_IDENTIFIER_REGEX: &str = r"^[a-zA-Z0-9_]+$";

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub label: String,
    pub severity: Severity,
    pub snippet: String,
}

pub struct ScanResult {
    pub sanitized: String,
    pub findings: Vec<Finding>,
    pub blocked: bool,
}

pub trait AlertSink: Send + Sync {
    fn alert(&self, findings: &[Finding], context: &str);
}

pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, findings: &[Finding], context: &str) {
        for finding in findings {
            tracing::warn!(
                label = %finding.label,
                severity = ?finding.severity,
                context,
                "security finding: {}",
                finding.snippet
            );
        }
    }
}

/// Logs every finding, then fires the batch at a webhook on a detached
/// task -- a slow or unreachable endpoint never blocks the scan that
/// triggered it.
pub struct HttpAlertSink {
    client: reqwest::Client,
    webhook: String,
}

impl HttpAlertSink {
    pub fn new(webhook: String) -> Self {
        Self { client: reqwest::Client::new(), webhook }
    }
}

impl AlertSink for HttpAlertSink {
    fn alert(&self, findings: &[Finding], context: &str) {
        TracingAlertSink.alert(findings, context);
        let client = self.client.clone();
        let webhook = self.webhook.clone();
        let payload = serde_json::json!({"context": context, "findings": findings});
        tokio::spawn(async move {
            if let Err(e) = client.post(&webhook).json(&payload).send().await {
                tracing::warn!(error = %e, "failed to deliver security alert webhook");
            }
        });
    }
}

#[derive(Clone)]
pub struct SecurityPipeline {
    mode: SanitizeMode,
    identifier_regex: Regex,
    alert_sink: std::sync::Arc<dyn AlertSink>,
    /// `false` when `SECURITY_ENABLED=false` -- `scan` becomes a no-op
    /// pass-through rather than running the denylist at all.
    enabled: bool,
}

impl SecurityPipeline {
    pub fn new(mode: SanitizeMode) -> Result<Self, SpiralError> {
        Self::with_alert_sink(mode, std::sync::Arc::new(TracingAlertSink))
    }

    pub fn with_alert_sink(mode: SanitizeMode, alert_sink: std::sync::Arc<dyn AlertSink>) -> Result<Self, SpiralError> {
        Self::build(mode, alert_sink, true)
    }

    /// A pass-through pipeline used when `SECURITY_ENABLED=false`:
    /// `scan` reports no findings and never blocks, bypassing the
    /// pipeline entirely rather than just relaxing its policy.
    pub fn passthrough() -> Result<Self, SpiralError> {
        Self::build(SanitizeMode::Neutralize, std::sync::Arc::new(TracingAlertSink), false)
    }

    fn build(mode: SanitizeMode, alert_sink: std::sync::Arc<dyn AlertSink>, enabled: bool) -> Result<Self, SpiralError> {
        let identifier_regex = Regex::new(SAFE_IDENTIFIER_REGEX)
            .map_err(|e| SpiralError::ConfigurationError(format!("invalid regex pattern: {e}")))?;
        Ok(Self { mode, identifier_regex, alert_sink, enabled })
    }

    /// Scans free-form text (task titles/descriptions, context values, RAG
    /// synthesis answers). Returns the sanitized text plus any findings.
    /// A critical finding always forces a block, overriding `self.mode`.
    pub fn scan(&self, input: &str, context: &str) -> ScanResult {
        if !self.enabled {
            return ScanResult { sanitized: input.to_string(), findings: Vec::new(), blocked: false };
        }

        let lower = input.to_lowercase();
        let mut findings = Vec::new();
        let mut working = input.to_string();

        for pattern in DENYLIST {
            if let Some(pos) = lower.find(pattern.needle) {
                let end = (pos + pattern.needle.len()).min(input.len());
                let snippet: String = input
                    .get(pos..end)
                    .unwrap_or(pattern.needle)
                    .chars()
                    .take(crate::constants::MAX_ALERT_SNIPPET_LENGTH)
                    .collect();
                findings.push(Finding {
                    label: pattern.label.to_string(),
                    severity: pattern.severity,
                    snippet,
                });
            }
        }

        let forced_block = findings.iter().any(|f| f.severity == Severity::Critical);
        let blocked = forced_block || (self.mode == SanitizeMode::Block && !findings.is_empty());

        if !findings.is_empty() {
            self.alert_sink.alert(&findings, context);
        }

        if !blocked {
            match self.mode {
                SanitizeMode::Remove => {
                    for pattern in DENYLIST {
                        working = remove_ignore_case(&working, pattern.needle);
                    }
                }
                SanitizeMode::Neutralize | SanitizeMode::Block => {
                    working = encode_text(&working).to_string();
                }
            }
        }

        ScanResult { sanitized: working, findings, blocked }
    }

    pub fn validate_and_sanitize_task_content(&self, content: &str) -> Result<String, SpiralError> {
        if content.trim().is_empty() {
            return Err(SpiralError::Validation("task content cannot be empty".to_string()));
        }
        if content.len() > MAX_TASK_CONTENT_LENGTH {
            return Err(SpiralError::Validation(format!(
                "task content exceeds maximum length of {MAX_TASK_CONTENT_LENGTH} characters"
            )));
        }
        self.run_or_reject(content, "task_content")
    }

    pub fn validate_context_key(&self, key: &str) -> Result<(), SpiralError> {
        if key.is_empty() || key.len() > MAX_CONTEXT_KEY_LENGTH {
            return Err(SpiralError::Validation(format!(
                "context key must be non-empty and under {MAX_CONTEXT_KEY_LENGTH} characters"
            )));
        }
        if !self.identifier_regex.is_match(key) {
            return Err(SpiralError::Validation(
                "context keys may only contain alphanumeric characters and underscores".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_and_sanitize_context_value(&self, value: &str) -> Result<String, SpiralError> {
        if value.len() > MAX_CONTEXT_VALUE_LENGTH {
            return Err(SpiralError::Validation(format!(
                "context value exceeds maximum length of {MAX_CONTEXT_VALUE_LENGTH} bytes"
            )));
        }
        self.run_or_reject(value, "context_value")
    }

    fn run_or_reject(&self, input: &str, context: &str) -> Result<String, SpiralError> {
        let result = self.scan(input, context);
        if result.blocked {
            return Err(SpiralError::Security(format!(
                "{context} rejected by security pipeline: {} finding(s)",
                result.findings.len()
            )));
        }
        Ok(result.sanitized)
    }
}

fn remove_ignore_case(haystack: &str, needle: &str) -> String {
    let lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    let mut rest_lower = lower.as_str();
    while let Some(pos) = rest_lower.find(&needle_lower) {
        out.push_str(&rest[..pos]);
        let end = pos + needle.len();
        rest = &rest[end.min(rest.len())..];
        rest_lower = &rest_lower[end.min(rest_lower.len())..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(mode: SanitizeMode) -> SecurityPipeline {
        SecurityPipeline::new(mode).unwrap()
    }

    #[test]
    fn clean_content_passes_through() {
        let p = pipeline(SanitizeMode::Neutralize);
        let result = p.validate_and_sanitize_task_content("Create a hello world function in Rust");
        assert!(result.is_ok());
    }

    #[test]
    fn script_tag_is_always_blocked_regardless_of_mode() {
        for mode in [SanitizeMode::Remove, SanitizeMode::Neutralize, SanitizeMode::Block] {
            let p = pipeline(mode);
            let result = p.validate_and_sanitize_task_content("<script>alert(1)</script>");
            assert!(result.is_err(), "mode {mode:?} should reject critical finding");
        }
    }

    #[test]
    fn remove_mode_strips_medium_severity_pattern() {
        let p = pipeline(SanitizeMode::Remove);
        let result = p
            .validate_and_sanitize_task_content("go up a level via ../ and read it")
            .unwrap();
        assert!(!result.contains("../"));
    }

    #[test]
    fn empty_content_rejected() {
        let p = pipeline(SanitizeMode::Neutralize);
        assert!(p.validate_and_sanitize_task_content("").is_err());
    }

    #[test]
    fn content_too_long_rejected() {
        let p = pipeline(SanitizeMode::Neutralize);
        let long = "x".repeat(MAX_TASK_CONTENT_LENGTH + 1);
        assert!(p.validate_and_sanitize_task_content(&long).is_err());
    }

    #[test]
    fn context_key_rejects_non_identifier_chars() {
        let p = pipeline(SanitizeMode::Neutralize);
        assert!(p.validate_context_key("valid_key").is_ok());
        assert!(p.validate_context_key("invalid key").is_err());
        assert!(p.validate_context_key("").is_err());
    }

    struct RecordingAlertSink {
        count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl AlertSink for RecordingAlertSink {
        fn alert(&self, findings: &[Finding], _context: &str) {
            self.count.fetch_add(findings.len(), std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn a_finding_is_forwarded_to_the_configured_alert_sink() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = std::sync::Arc::new(RecordingAlertSink { count: count.clone() });
        let p = SecurityPipeline::with_alert_sink(SanitizeMode::Block, sink).unwrap();
        let _ = p.validate_and_sanitize_task_content("<script>alert(1)</script>");
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn clean_content_never_touches_the_alert_sink() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = std::sync::Arc::new(RecordingAlertSink { count: count.clone() });
        let p = SecurityPipeline::with_alert_sink(SanitizeMode::Neutralize, sink).unwrap();
        let _ = p.validate_and_sanitize_task_content("a perfectly normal description");
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
