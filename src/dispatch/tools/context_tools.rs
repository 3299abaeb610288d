use super::{field, opt_str_field, str_field};
use crate::context::ContextStore;
use crate::dispatch::{RequestContext, Tool, ToolOutput};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct UpdateProjectContext(pub Arc<ContextStore>);

#[async_trait]
impl Tool for UpdateProjectContext {
    fn name(&self) -> &str {
        "update_project_context"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "value": {"type": "object"},
                "description": {"type": "string"}
            },
            "required": ["key", "value"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "key").map(drop)?;
        field(args, "value").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let key = str_field(&args, "key")?;
        let value = field(&args, "value")?.clone();
        let description = opt_str_field(&args, "description");
        let entry = self.0.update_project_context(&key, value, description, ctx.subject.as_str().to_string()).await?;
        Ok(ToolOutput::json(&serde_json::json!({"entry": entry})))
    }
}

pub struct ViewProjectContext(pub Arc<ContextStore>);

#[async_trait]
impl Tool for ViewProjectContext {
    fn name(&self) -> &str {
        "view_project_context"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"key": {"type": "string"}}})
    }

    fn validate(&self, _args: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let key = opt_str_field(&args, "key");
        let entries = self.0.view_project_context(key.as_deref()).await?;
        Ok(ToolOutput::json(&serde_json::json!({"entries": entries})))
    }
}

pub struct QueryProjectContext(pub Arc<ContextStore>);

#[async_trait]
impl Tool for QueryProjectContext {
    fn name(&self) -> &str {
        "query_project_context"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"pattern": {"type": "string"}}, "required": ["pattern"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "pattern").map(drop)
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let pattern = str_field(&args, "pattern")?;
        let entries = self.0.query_project_context(&pattern).await?;
        Ok(ToolOutput::json(&serde_json::json!({"entries": entries})))
    }
}
