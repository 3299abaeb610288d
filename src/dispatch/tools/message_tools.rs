use super::{field, opt_str_field, str_field};
use crate::agents::AgentManager;
use crate::dispatch::{RequestContext, Tool, ToolOutput};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SendAgentMessage(pub Arc<AgentManager>);

#[async_trait]
impl Tool for SendAgentMessage {
    fn name(&self) -> &str {
        "send_agent_message"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"to": {"type": "string"}, "payload": {"type": "object"}},
            "required": ["to", "payload"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "to").map(drop)?;
        field(args, "payload").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let to = str_field(&args, "to")?;
        let payload = field(&args, "payload")?.clone();
        let message = self.0.send_message(ctx.subject.as_str(), Some(&to), payload).await?;
        Ok(ToolOutput::json(&serde_json::json!({"message": message})))
    }
}

pub struct BroadcastMessage(pub Arc<AgentManager>);

#[async_trait]
impl Tool for BroadcastMessage {
    fn name(&self) -> &str {
        "broadcast_message"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"payload": {"type": "object"}}, "required": ["payload"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        field(args, "payload").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let payload = field(&args, "payload")?.clone();
        let message = self.0.send_message(ctx.subject.as_str(), None, payload).await?;
        Ok(ToolOutput::json(&serde_json::json!({"message": message})))
    }
}

pub struct GetAgentMessages(pub Arc<AgentManager>);

#[async_trait]
impl Tool for GetAgentMessages {
    fn name(&self) -> &str {
        "get_agent_messages"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"agent_id": {"type": "string"}}})
    }

    fn validate(&self, _args: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let agent_id = opt_str_field(&args, "agent_id").unwrap_or_else(|| ctx.subject.as_str().to_string());
        let messages = self.0.inbox(&agent_id).await?;
        Ok(ToolOutput::json(&serde_json::json!({"messages": messages})))
    }
}
