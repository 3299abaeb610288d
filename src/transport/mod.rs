//! JSON-RPC framing shared by both wire transports (§6): a
//! line-delimited stdio stream for subprocess hosting, and the same
//! frame shape read/written over a streaming HTTP body. Both route
//! `tools/call` through the one [`crate::dispatch::Dispatcher`].

pub mod stdio;
pub mod streaming_http;

use crate::dispatch::{Dispatcher, RequestContext, ToolOutput};
use crate::models::Subject;
use crate::{Result, SpiralError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Option<serde_json::Value>, error: &SpiralError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code: error.wire_code(), message: error.to_string() }),
        }
    }

    fn parse_error(message: String) -> Self {
        Self { jsonrpc: "2.0", id: None, result: None, error: Some(RpcError { code: -32700, message }) }
    }
}

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

fn tool_output_to_value(output: ToolOutput) -> serde_json::Value {
    serde_json::json!({ "content": output.content })
}

/// Handles one decoded frame against `dispatcher`, under `subject`'s
/// identity. `request_id` is a fresh correlation id for this call, not
/// the JSON-RPC `id` field (which merely pairs request/response on the
/// wire and may be null or reused by a careless client).
pub async fn handle_frame(dispatcher: &Dispatcher, subject: Subject, request_id: String, line: &str) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return RpcResponse::parse_error(format!("invalid request: {e}")),
    };
    let id = request.id.clone();
    match dispatch_method(dispatcher, subject, request_id, request).await {
        Ok(value) => RpcResponse::ok(id, value),
        Err(e) => RpcResponse::err(id, &e),
    }
}

async fn dispatch_method(
    dispatcher: &Dispatcher,
    subject: Subject,
    request_id: String,
    request: RpcRequest,
) -> Result<serde_json::Value> {
    match request.method.as_str() {
        "initialize" => Ok(serde_json::json!({
            "protocolVersion": "2024-11-05",
            "serverName": "spiral-core",
            "serverVersion": env!("CARGO_PKG_VERSION"),
        })),
        "tools/list" => Ok(serde_json::json!({ "tools": dispatcher.catalog() })),
        "tools/call" => {
            let params: CallToolParams = serde_json::from_value(request.params)
                .map_err(|e| SpiralError::Validation(format!("tools/call params: {e}")))?;
            let ctx = RequestContext::new(request_id, subject, Duration::from_secs(crate::constants::DEFAULT_TOOL_DEADLINE_SECS));
            let output = dispatcher.call(ctx, &params.name, params.arguments).await?;
            Ok(tool_output_to_value(output))
        }
        other => Err(SpiralError::Validation(format!("unsupported method: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SanitizeMode;
    use crate::dispatch::Tool;
    use crate::validation::SecurityPipeline;
    use async_trait::async_trait;

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

    fn dispatcher() -> Dispatcher {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        Dispatcher::new(vec![Box::new(EchoTool)], security, 4)
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server_version() {
        let response = handle_frame(
            &dispatcher(),
            Subject::Admin,
            "req-1".to_string(),
            r#"{"id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverVersion"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn tools_list_includes_every_registered_tool() {
        let response = handle_frame(
            &dispatcher(),
            Subject::Admin,
            "req-1".to_string(),
            r#"{"id":1,"method":"tools/list","params":{}}"#,
        )
        .await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
    }

    #[tokio::test]
    async fn tools_call_round_trips_arguments() {
        let response = handle_frame(
            &dispatcher(),
            Subject::Admin,
            "req-1".to_string(),
            r#"{"id":7,"method":"tools/call","params":{"name":"echo","arguments":{"x":1}}}"#,
        )
        .await;
        assert_eq!(response.id, Some(serde_json::json!(7)));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_surfaces_as_rpc_error_not_found() {
        let response = handle_frame(
            &dispatcher(),
            Subject::Admin,
            "req-1".to_string(),
            r#"{"id":1,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, SpiralError::NotFound(String::new()).wire_code());
    }

    #[tokio::test]
    async fn unsupported_method_is_a_validation_error() {
        let response = handle_frame(&dispatcher(), Subject::Admin, "req-1".to_string(), r#"{"method":"bogus"}"#).await;
        assert!(response.error.is_some());
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn malformed_json_produces_parse_error_with_null_id() {
        let response = handle_frame(&dispatcher(), Subject::Admin, "req-1".to_string(), "not json").await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32700);
        assert!(response.id.is_none());
    }
}
