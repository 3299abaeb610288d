use super::field;
use crate::dispatch::{RequestContext, Tool, ToolOutput};
use crate::rag::RagEngine;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps the engine handle; `None` when RAG was disabled at startup
/// (missing provider credentials) so the tool stays registered and
/// answers honestly instead of the dispatcher rejecting the call
/// outright.
pub struct AskProjectRag(pub Option<Arc<RagEngine>>);

#[async_trait]
impl Tool for AskProjectRag {
    fn name(&self) -> &str {
        "ask_project_rag"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}, "top_k": {"type": "integer"}},
            "required": ["query"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        field(args, "query")?
            .as_str()
            .ok_or_else(|| crate::SpiralError::Validation("query must be a string".to_string()))?;
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let query = field(&args, "query")?.as_str().unwrap().to_string();
        let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(crate::constants::RAG_DEFAULT_TOP_K as u64) as usize;

        match &self.0 {
            Some(engine) => {
                let answer = engine.ask_project_rag(&query, top_k).await?;
                Ok(ToolOutput::json(&serde_json::to_value(answer)?))
            }
            None => Ok(ToolOutput::json(&serde_json::json!({
                "answer": "",
                "sources": [],
                "confidence": 0.0,
                "context_keys_used": [],
                "suggested_queries": [],
                "low_confidence": true,
                "reason": "RAG engine is disabled: no embedding/chat provider credentials configured",
            }))),
        }
    }
}
