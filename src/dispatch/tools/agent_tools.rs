use super::{opt_str_field, str_field};
use crate::agents::AgentManager;
use crate::dispatch::{RequestContext, Tool, ToolOutput};
use crate::{Result, SpiralError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub struct CreateAgent(pub Arc<AgentManager>);

#[async_trait]
impl Tool for CreateAgent {
    fn name(&self) -> &str {
        "create_agent"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "capabilities": {"type": "array", "items": {"type": "string"}},
                "working_directory": {"type": "string"},
                "role": {"type": "string"}
            },
            "required": ["agent_id", "working_directory"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "agent_id").map(drop)?;
        str_field(args, "working_directory").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        ctx.require_admin()?;
        let agent_id = str_field(&args, "agent_id")?;
        let working_directory = str_field(&args, "working_directory")?;
        let role = opt_str_field(&args, "role");
        let capabilities: HashSet<String> = args
            .get("capabilities")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let (agent, token) = self.0.spawn_agent(agent_id, capabilities, working_directory, role).await?;
        Ok(ToolOutput::json(&serde_json::json!({"agent": agent, "token": token})))
    }
}

pub struct TerminateAgent(pub Arc<AgentManager>);

#[async_trait]
impl Tool for TerminateAgent {
    fn name(&self) -> &str {
        "terminate_agent"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"agent_id": {"type": "string"}}, "required": ["agent_id"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "agent_id").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        ctx.require_admin()?;
        let agent_id = str_field(&args, "agent_id")?;
        self.0.terminate_agent(&agent_id).await?;
        Ok(ToolOutput::json(&serde_json::json!({"terminated": true})))
    }
}

pub struct ListAgents(pub Arc<AgentManager>);

#[async_trait]
impl Tool for ListAgents {
    fn name(&self) -> &str {
        "list_agents"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn validate(&self, _args: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: &RequestContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let agents = self.0.list_agents().await?;
        Ok(ToolOutput::json(&serde_json::json!({"agents": agents})))
    }
}

/// Reports auth-token liveness for an agent rather than LLM usage
/// accounting -- there is no cost-metering subsystem in this core, and
/// the raw token value is never retrievable once issued.
pub struct GetAgentTokens(pub Arc<AgentManager>);

#[async_trait]
impl Tool for GetAgentTokens {
    fn name(&self) -> &str {
        "get_agent_tokens"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"agent_id": {"type": "string"}}, "required": ["agent_id"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "agent_id").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let agent_id = str_field(&args, "agent_id")?;
        if !ctx.subject.is_admin() && ctx.subject.as_str() != agent_id {
            return Err(SpiralError::PermissionDenied("agents may only inspect their own token status".to_string()));
        }
        let agent = self.0.get_agent(&agent_id).await?;
        Ok(ToolOutput::json(&serde_json::json!({
            "agent_id": agent.agent_id,
            "status": agent.status,
            "has_active_token": !matches!(agent.status, crate::models::AgentStatus::Terminated),
        })))
    }
}
