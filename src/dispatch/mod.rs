//! Tool registry and dispatch pipeline: the single place a transport
//! frame turns into a validated, security-scanned, audited tool
//! invocation.

pub mod tools;

use crate::auth::{AuditEntry, AuditSink, TracingAuditSink};
use crate::models::Subject;
use crate::validation::SecurityPipeline;
use crate::{Result, SpiralError};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content: vec![ContentItem { kind: "text".to_string(), text: text.into() }] }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(serde_json::to_string(value).unwrap_or_default())
    }
}

/// Per-call scope threaded through every tool implementation: who is
/// calling, under what request id, and by when the call must finish.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub subject: Subject,
    pub deadline: Instant,
}

impl RequestContext {
    pub fn new(request_id: String, subject: Subject, timeout: std::time::Duration) -> Self {
        Self { request_id, subject, deadline: Instant::now() + timeout }
    }

    pub fn deadline_remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.subject.is_admin() {
            Ok(())
        } else {
            Err(SpiralError::PermissionDenied("this operation requires the admin subject".to_string()))
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    fn validate(&self, args: &serde_json::Value) -> Result<()>;
    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput>;
}

pub struct Dispatcher {
    tools: HashMap<String, Box<dyn Tool>>,
    security: Arc<SecurityPipeline>,
    permits: Arc<Semaphore>,
    audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    pub fn new(tools: Vec<Box<dyn Tool>>, security: Arc<SecurityPipeline>, max_concurrent: usize) -> Self {
        let tools = tools.into_iter().map(|t| (t.name().to_string(), t)).collect();
        Self { tools, security, permits: Arc::new(Semaphore::new(max_concurrent)), audit: Arc::new(TracingAuditSink) }
    }

    /// Swaps in a durable audit sink (the `PgStore`, in production); the
    /// default from [`Dispatcher::new`] only logs audit checkpoints.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Runs steps 3-10 of the dispatch contract (authentication already
    /// happened at the transport boundary, producing `ctx.subject`). An
    /// audit row is written for every call that reaches this point,
    /// whichever way it resolves, since only already-authenticated calls
    /// ever do.
    pub async fn call(&self, ctx: RequestContext, name: &str, args: serde_json::Value) -> Result<ToolOutput> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SpiralError::Unavailable("dispatcher is shutting down".to_string()))?;

        let result = self.dispatch_inner(&ctx, name, &args).await;

        let error_kind = result.as_ref().err().map(|e| e.kind().to_string());
        self.audit
            .record(AuditEntry::new(ctx.subject.as_str(), name, &ctx.request_id, result.is_ok(), error_kind))
            .await;

        match &result {
            Ok(_) => {
                tracing::info!(request_id = %ctx.request_id, tool = name, subject = ctx.subject.as_str(), "tool call succeeded")
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, tool = name, subject = ctx.subject.as_str(), error = %e, "tool call failed")
            }
        }

        result
    }

    async fn dispatch_inner(&self, ctx: &RequestContext, name: &str, args: &serde_json::Value) -> Result<ToolOutput> {
        let tool = self.tools.get(name).ok_or_else(|| SpiralError::NotFound(format!("unknown tool: {name}")))?;

        tool.validate(args)?;
        self.input_scan(args)?;

        let result = tokio::time::timeout(ctx.deadline_remaining(), self.invoke_guarded(tool.as_ref(), ctx, args.clone()))
            .await
            .map_err(|_| SpiralError::Deadline(format!("{name} exceeded its deadline")))??;

        self.output_scan(result)
    }

    async fn invoke_guarded(&self, tool: &dyn Tool, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        match AssertUnwindSafe(tool.execute(ctx, args)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(request_id = %ctx.request_id, tool = tool.name(), "tool implementation panicked");
                Err(SpiralError::Internal(anyhow::anyhow!("tool '{}' panicked", tool.name())))
            }
        }
    }

    /// Tool catalog for `tools/list`: name and input schema per registered
    /// tool, in no particular order.
    pub fn catalog(&self) -> Vec<serde_json::Value> {
        self.tools
            .values()
            .map(|t| serde_json::json!({"name": t.name(), "inputSchema": t.input_schema()}))
            .collect()
    }

    fn input_scan(&self, args: &serde_json::Value) -> Result<()> {
        scan_strings(args, &self.security)
    }

    fn output_scan(&self, output: ToolOutput) -> Result<ToolOutput> {
        let mut content = Vec::with_capacity(output.content.len());
        for item in output.content {
            let sanitized = self.security.validate_and_sanitize_task_content(&item.text).unwrap_or(item.text);
            content.push(ContentItem { kind: item.kind, text: sanitized });
        }
        Ok(ToolOutput { content })
    }
}

fn scan_strings(value: &serde_json::Value, security: &SecurityPipeline) -> Result<()> {
    match value {
        serde_json::Value::String(s) => {
            let result = security.scan(s, "tool_args");
            if result.blocked {
                return Err(SpiralError::Security(format!(
                    "tool arguments rejected by security pipeline: {} finding(s)",
                    result.findings.len()
                )));
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                scan_strings(item, security)?;
            }
            Ok(())
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                scan_strings(v, security)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SanitizeMode;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn validate(&self, _args: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
            Ok(ToolOutput::json(&args))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "panics"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn validate(&self, _args: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn execute(&self, _ctx: &RequestContext, _args: serde_json::Value) -> Result<ToolOutput> {
            panic!("boom");
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("req-1".to_string(), Subject::Admin, std::time::Duration::from_secs(5))
    }

    #[derive(Default)]
    struct RecordingAuditSink {
        entries: tokio::sync::Mutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn record(&self, entry: AuditEntry) {
            self.entries.lock().await.push(entry);
        }
    }

    #[tokio::test]
    async fn unknown_tool_returns_not_found() {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        let dispatcher = Dispatcher::new(vec![], security, 4);
        let err = dispatcher.call(ctx(), "nope", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, SpiralError::NotFound(_)));
    }

    #[tokio::test]
    async fn successful_call_round_trips_args() {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        let dispatcher = Dispatcher::new(vec![Box::new(EchoTool)], security, 4);
        let out = dispatcher.call(ctx(), "echo", serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out.content.len(), 1);
    }

    #[tokio::test]
    async fn malicious_args_are_rejected_before_execute() {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Block).unwrap());
        let dispatcher = Dispatcher::new(vec![Box::new(EchoTool)], security, 4);
        let err = dispatcher
            .call(ctx(), "echo", serde_json::json!({"title": "<script>alert(1)</script>"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SpiralError::Security(_)));
    }

    #[tokio::test]
    async fn panicking_tool_surfaces_as_internal() {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        let dispatcher = Dispatcher::new(vec![Box::new(PanicTool)], security, 4);
        let err = dispatcher.call(ctx(), "panics", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, SpiralError::Internal(_)));
    }

    #[tokio::test]
    async fn successful_call_audits_with_matching_request_id() {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        let sink = Arc::new(RecordingAuditSink::default());
        let dispatcher = Dispatcher::new(vec![Box::new(EchoTool)], security, 4).with_audit_sink(sink.clone());
        dispatcher.call(ctx(), "echo", serde_json::json!({"x": 1})).await.unwrap();

        let entries = sink.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_id, "req-1");
        assert_eq!(entries[0].tool, "echo");
        assert!(entries[0].success);
        assert!(entries[0].error_kind.is_none());
    }

    #[tokio::test]
    async fn failed_call_still_audits_with_its_error_kind() {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        let sink = Arc::new(RecordingAuditSink::default());
        let dispatcher = Dispatcher::new(vec![], security, 4).with_audit_sink(sink.clone());
        let err = dispatcher.call(ctx(), "nope", serde_json::json!({})).await.unwrap_err();

        let entries = sink.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_id, "req-1");
        assert!(!entries[0].success);
        assert_eq!(entries[0].error_kind.as_deref(), Some(err.kind()));
    }
}
