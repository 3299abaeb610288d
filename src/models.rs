//! Core data model shared across the persistence layer, the dispatcher,
//! and the realtime fan-out: `Agent`, `Task`, `ContextEntry`, `FileClaim`,
//! `AgentMessage`, `RagChunk`, `RagAnswer`, `Token`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

/// Generates a short opaque identifier, carried everywhere as `String` so
/// it round-trips losslessly through JSON-RPC text content.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Created,
    Active,
    Terminated,
}

impl FromStr for AgentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "active" => Ok(Self::Active),
            "terminated" => Ok(Self::Terminated),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    /// Never serialized back to clients outside of token issuance.
    #[serde(skip_serializing)]
    pub token: String,
    pub capabilities: HashSet<String>,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub working_directory: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(agent_id: String, capabilities: HashSet<String>, working_directory: String) -> Self {
        let now = Utc::now();
        Self {
            agent_id,
            token: String::new(),
            capabilities,
            status: AgentStatus::Created,
            current_task: None,
            working_directory,
            role: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// The status FSM, expressed as a pure adjacency check -- every
    /// mutation path routes through this instead of re-deriving it.
    pub fn can_transition_to(&self, next: &TaskStatus) -> bool {
        use TaskStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Pending)
                | (InProgress, Cancelled)
        )
    }
}

impl FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Scope a `display_order` value is unique/dense within. Per-parent is the
/// default; global ordering is offered for flat task-list UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderScope {
    Parent(Option<String>),
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub parent_task: Option<String>,
    pub depends_on_tasks: Vec<String>,
    pub tags: HashSet<String>,
    pub display_order: i64,
    pub due_date: Option<chrono::NaiveDate>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: String, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            task_id: new_id(),
            title,
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            created_by,
            assigned_to: None,
            parent_task: None,
            depends_on_tasks: Vec::new(),
            tags: HashSet::new(),
            display_order: 0,
            due_date: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------
// ContextEntry
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub context_key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContextHistoryRow {
    pub context_key: String,
    pub value: serde_json::Value,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// FileClaim
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileClaim {
    pub file_path: String,
    pub agent_id: String,
    pub claimed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// AgentMessage
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub from_agent: String,
    /// `None` for broadcasts.
    pub to_agent: Option<String>,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl AgentMessage {
    pub fn new(from_agent: String, to_agent: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            message_id: new_id(),
            from_agent,
            to_agent,
            payload,
            sent_at: Utc::now(),
            read_at: None,
        }
    }
}

// ---------------------------------------------------------------------
// RAG entities
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Markdown,
    Code,
    Context,
    Task,
    Message,
}

impl FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "code" => Ok(Self::Code),
            "context" => Ok(Self::Context),
            "task" => Ok(Self::Task),
            "message" => Ok(Self::Message),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagChunk {
    pub chunk_id: String,
    pub source_type: SourceType,
    pub source_ref: String,
    pub text: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A fixed-dimension embedding vector, wrapped so a `sqlx::Type` impl can
/// target the pgvector `vector(d)` column without conflicting with a
/// blanket `Vec<f32>` impl elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagEmbedding {
    pub chunk_id: String,
    pub vector: Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagMeta {
    pub last_walk_at: Option<DateTime<Utc>>,
    pub cursors: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSource {
    pub source_ref: String,
    pub source_type: SourceType,
    pub similarity: f32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<RagSource>,
    pub confidence: f32,
    pub context_keys_used: Vec<String>,
    pub suggested_queries: Vec<String>,
    pub low_confidence: bool,
}

// ---------------------------------------------------------------------
// Token / subject
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Admin,
    Agent(String),
}

impl Subject {
    pub fn is_admin(&self) -> bool {
        matches!(self, Subject::Admin)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Subject::Admin => crate::constants::ADMIN_AGENT_ID,
            Subject::Agent(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRow {
    pub token: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------
// Realtime change events
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub entity_id: String,
    pub changes: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(event_type: impl Into<String>, entity_id: impl Into<String>, changes: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            entity_id: entity_id.into(),
            changes,
            ts: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_start_and_cancel() {
        assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::InProgress));
        assert!(TaskStatus::Pending.can_transition_to(&TaskStatus::Cancelled));
        assert!(!TaskStatus::Pending.can_transition_to(&TaskStatus::Completed));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for terminal in [TaskStatus::Completed, TaskStatus::Cancelled, TaskStatus::Failed] {
            for next in [
                TaskStatus::Pending,
                TaskStatus::InProgress,
                TaskStatus::Completed,
                TaskStatus::Cancelled,
                TaskStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(&next));
            }
        }
    }

    #[test]
    fn in_progress_can_pause_back_to_pending() {
        assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Pending));
        assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Failed));
    }
}
