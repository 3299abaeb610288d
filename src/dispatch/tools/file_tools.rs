use super::str_field;
use crate::agents::AgentManager;
use crate::dispatch::{RequestContext, Tool, ToolOutput};
use crate::{Result, SpiralError};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ClaimFile(pub Arc<AgentManager>);

#[async_trait]
impl Tool for ClaimFile {
    fn name(&self) -> &str {
        "claim_file"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "path").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let path = str_field(&args, "path")?;
        let (claimed, holder) = self.0.claim_file(&path, ctx.subject.as_str()).await?;
        Ok(ToolOutput::json(&serde_json::json!({"claimed": claimed, "holder": holder})))
    }
}

pub struct ReleaseFile(pub Arc<AgentManager>);

#[async_trait]
impl Tool for ReleaseFile {
    fn name(&self) -> &str {
        "release_file"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "path").map(drop)
    }

    async fn execute(&self, ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let path = str_field(&args, "path")?;
        let holder = match self.0.file_metadata(&path).await? {
            Some(claim) => claim.agent_id,
            None => return Err(SpiralError::NotFound(format!("no claim on {path}"))),
        };
        if !ctx.subject.is_admin() && ctx.subject.as_str() != holder {
            return Err(SpiralError::PermissionDenied(format!("{path} is held by {holder}, not you")));
        }
        self.0.release_file(&path, &holder).await?;
        Ok(ToolOutput::json(&serde_json::json!({"released": true})))
    }
}

pub struct GetFileMetadata(pub Arc<AgentManager>);

#[async_trait]
impl Tool for GetFileMetadata {
    fn name(&self) -> &str {
        "get_file_metadata"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
    }

    fn validate(&self, args: &serde_json::Value) -> Result<()> {
        str_field(args, "path").map(drop)
    }

    async fn execute(&self, _ctx: &RequestContext, args: serde_json::Value) -> Result<ToolOutput> {
        let path = str_field(&args, "path")?;
        let claim = self.0.file_metadata(&path).await?;
        Ok(ToolOutput::json(&serde_json::json!({"claim": claim})))
    }
}
