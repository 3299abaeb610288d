//! The 21 tools grouped by concern, each a thin wrapper translating
//! JSON arguments into calls against the already-built service layer
//! (`AgentManager`, `TaskStore`, `ContextStore`, `RagEngine`).

pub mod agent_tools;
pub mod context_tools;
pub mod file_tools;
pub mod message_tools;
pub mod rag_tools;
pub mod task_tools;

use super::Tool;
use crate::agents::AgentManager;
use crate::context::ContextStore;
use crate::rag::RagEngine;
use crate::tasks::TaskStore;
use std::sync::Arc;

/// Builds the full tool catalog from the service handles the lifecycle
/// already constructed. `rag` is `None` when the engine was disabled at
/// startup (missing credentials); `ask_project_rag` then always
/// reports `low_confidence` via [`rag_tools::DisabledRag`].
pub fn build_registry(
    agents: Arc<AgentManager>,
    tasks: Arc<TaskStore>,
    context: Arc<ContextStore>,
    rag: Option<Arc<RagEngine>>,
) -> Vec<Box<dyn Tool>> {
    let mut tools: Vec<Box<dyn Tool>> = vec![
        Box::new(agent_tools::CreateAgent(agents.clone())),
        Box::new(agent_tools::TerminateAgent(agents.clone())),
        Box::new(agent_tools::ListAgents(agents.clone())),
        Box::new(agent_tools::GetAgentTokens(agents.clone())),
        Box::new(task_tools::CreateTask(tasks.clone())),
        Box::new(task_tools::UpdateTaskStatus(tasks.clone())),
        Box::new(task_tools::UpdateTaskFields(tasks.clone())),
        Box::new(task_tools::ViewTasks(tasks.clone())),
        Box::new(task_tools::SearchTasks(tasks.clone())),
        Box::new(task_tools::BulkUpdateTasks(tasks.clone())),
        Box::new(task_tools::ReorderTasks(tasks.clone())),
        Box::new(task_tools::DeleteTask(tasks.clone())),
        Box::new(task_tools::AssignTask(tasks.clone())),
        Box::new(context_tools::UpdateProjectContext(context.clone())),
        Box::new(context_tools::ViewProjectContext(context.clone())),
        Box::new(context_tools::QueryProjectContext(context.clone())),
        Box::new(message_tools::SendAgentMessage(agents.clone())),
        Box::new(message_tools::BroadcastMessage(agents.clone())),
        Box::new(message_tools::GetAgentMessages(agents.clone())),
        Box::new(file_tools::ClaimFile(agents.clone())),
        Box::new(file_tools::ReleaseFile(agents.clone())),
        Box::new(file_tools::GetFileMetadata(agents)),
    ];
    tools.push(Box::new(rag_tools::AskProjectRag(rag)));
    tools
}

pub(super) fn field<'a>(args: &'a serde_json::Value, name: &str) -> crate::Result<&'a serde_json::Value> {
    args.get(name)
        .ok_or_else(|| crate::SpiralError::Validation(format!("missing required field: {name}")))
}

pub(super) fn str_field(args: &serde_json::Value, name: &str) -> crate::Result<String> {
    field(args, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| crate::SpiralError::Validation(format!("field {name} must be a string")))
}

pub(super) fn opt_str_field(args: &serde_json::Value, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(str::to_string)
}
