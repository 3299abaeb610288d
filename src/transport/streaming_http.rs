//! Streaming HTTP framing for the same JSON-RPC frames `stdio` speaks.
//! A client posts one or more newline-delimited requests in a single
//! body; the handler dispatches each in order against the one shared
//! [`Dispatcher`] and writes back one newline-delimited response per
//! request. `Subject` arrives as a request extension, already resolved
//! by [`crate::auth::auth_middleware`] upstream.

use crate::dispatch::Dispatcher;
use crate::models::Subject;
use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub const CONTENT_TYPE: &str = "application/x-ndjson";

pub async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    Extension(subject): Extension<Subject>,
    body: Bytes,
) -> Response {
    let text = match std::str::from_utf8(&body) {
        Ok(t) => t,
        Err(_) => return (StatusCode::BAD_REQUEST, "request body must be utf-8").into_response(),
    };

    let mut out = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let response = super::handle_frame(&dispatcher, subject.clone(), request_id, trimmed).await;
        match serde_json::to_string(&response) {
            Ok(encoded) => {
                out.push_str(&encoded);
                out.push('\n');
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode rpc response");
            }
        }
    }

    ([(header::CONTENT_TYPE, CONTENT_TYPE)], out).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SanitizeMode;
    use crate::dispatch::{RequestContext, Tool, ToolOutput};
    use crate::validation::SecurityPipeline;
    use async_trait::async_trait;
    use axum::body::to_bytes;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn validate(&self, _args: &serde_json::Value) -> crate::Result<()> {
            Ok(())
        }
        async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> crate::Result<ToolOutput> {
            Ok(ToolOutput::json(&args))
        }
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let security = Arc::new(SecurityPipeline::new(SanitizeMode::Neutralize).unwrap());
        Arc::new(Dispatcher::new(vec![Box::new(EchoTool)], security, 4))
    }

    #[tokio::test]
    async fn two_requests_in_one_body_produce_two_ndjson_responses() {
        let body = "{\"id\":1,\"method\":\"initialize\",\"params\":{}}\n{\"id\":2,\"method\":\"tools/list\",\"params\":{}}\n";
        let response = handle(State(dispatcher()), Extension(Subject::Admin), Bytes::from(body)).await;
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let body = "\n\n{\"id\":1,\"method\":\"initialize\",\"params\":{}}\n\n";
        let response = handle(State(dispatcher()), Extension(Subject::Admin), Bytes::from(body)).await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn non_utf8_body_is_rejected() {
        let response = handle(State(dispatcher()), Extension(Subject::Admin), Bytes::from(vec![0xff, 0xfe])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
