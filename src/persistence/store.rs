//! The concrete Postgres-backed store. Reads run directly against the
//! pool; writes route through the [`WriteQueue`] so ordering guarantees
//! hold for callers that never see the queue directly.

use super::write_queue::WriteQueue;
use crate::auth::TokenStore;
use crate::models::*;
use crate::{Result, SpiralError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

pub struct PgStore {
    pool: PgPool,
    writes: WriteQueue,
}

impl PgStore {
    pub fn new(pool: PgPool, writes: WriteQueue) -> Self {
        Self { pool, writes }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn write_queue_depth(&self) -> usize {
        self.writes.depth()
    }

    // ---------------------------------------------------------------
    // Agents
    // ---------------------------------------------------------------

    pub async fn insert_agent(&self, agent: Agent) -> Result<()> {
        self.writes
            .submit(move |pool| {
                let agent = agent.clone();
                async move {
                    let capabilities: Vec<String> = agent.capabilities.into_iter().collect();
                    sqlx::query(
                        "INSERT INTO agents (agent_id, capabilities, status, current_task, working_directory, role, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                    )
                    .bind(&agent.agent_id)
                    .bind(serde_json::to_value(&capabilities)?)
                    .bind(status_str(&agent.status))
                    .bind(&agent.current_task)
                    .bind(&agent.working_directory)
                    .bind(&agent.role)
                    .bind(agent.created_at)
                    .bind(agent.updated_at)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    pub async fn terminate_agent(&self, agent_id: &str) -> Result<()> {
        let agent_id = agent_id.to_string();
        self.writes
            .submit(move |pool| {
                let agent_id = agent_id.clone();
                async move {
                    let result = sqlx::query(
                        "UPDATE agents SET status = 'terminated', updated_at = now() WHERE agent_id = $1",
                    )
                    .bind(&agent_id)
                    .execute(&pool)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(SpiralError::NotFound(format!("agent not found: {agent_id}")));
                    }
                    Ok(())
                }
            })
            .await
    }

    /// Drops every file claim held by `agent_id`, regardless of how many
    /// there are. Used when an agent terminates so its advisory locks
    /// don't outlive it.
    pub async fn release_claims_for_agent(&self, agent_id: &str) -> Result<()> {
        let agent_id = agent_id.to_string();
        self.writes
            .submit(move |pool| {
                let agent_id = agent_id.clone();
                async move {
                    sqlx::query("DELETE FROM file_claims WHERE agent_id = $1")
                        .bind(&agent_id)
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    /// Returns every `in_progress` task assigned to `agent_id` back to
    /// `pending` and clears its assignment, so a terminated agent's work
    /// re-enters the pool instead of sitting stuck.
    pub async fn reassign_in_progress_tasks(&self, agent_id: &str) -> Result<()> {
        let agent_id = agent_id.to_string();
        self.writes
            .submit(move |pool| {
                let agent_id = agent_id.clone();
                async move {
                    sqlx::query(
                        "UPDATE tasks SET status = 'pending', assigned_to = NULL, updated_at = now()
                         WHERE assigned_to = $1 AND status = 'in_progress'",
                    )
                    .bind(&agent_id)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    pub async fn insert_task(&self, task: Task) -> Result<()> {
        self.writes
            .submit(move |pool| {
                let task = task.clone();
                async move {
                    let tags: Vec<String> = task.tags.into_iter().collect();
                    sqlx::query(
                        "INSERT INTO tasks (task_id, title, description, status, priority, created_by, assigned_to,
                                             parent_task, depends_on_tasks, tags, display_order, due_date, metadata,
                                             created_at, updated_at)
                         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
                    )
                    .bind(&task.task_id)
                    .bind(&task.title)
                    .bind(&task.description)
                    .bind(status_str(&task.status))
                    .bind(priority_str(&task.priority))
                    .bind(&task.created_by)
                    .bind(&task.assigned_to)
                    .bind(&task.parent_task)
                    .bind(serde_json::to_value(&task.depends_on_tasks)?)
                    .bind(serde_json::to_value(&tags)?)
                    .bind(task.display_order)
                    .bind(task.due_date)
                    .bind(serde_json::to_value(&task.metadata)?)
                    .bind(task.created_at)
                    .bind(task.updated_at)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks ORDER BY parent_task NULLS FIRST, display_order")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    pub async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        let task_id = task_id.to_string();
        self.writes
            .submit(move |pool| {
                let task_id = task_id.clone();
                async move {
                    sqlx::query("UPDATE tasks SET status = $2, updated_at = now() WHERE task_id = $1")
                        .bind(&task_id)
                        .bind(status_str(&status))
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn set_display_order(&self, task_id: &str, display_order: i64) -> Result<()> {
        let task_id = task_id.to_string();
        self.writes
            .submit(move |pool| {
                let task_id = task_id.clone();
                async move {
                    sqlx::query("UPDATE tasks SET display_order = $2, updated_at = now() WHERE task_id = $1")
                        .bind(&task_id)
                        .bind(display_order)
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn assign_task(&self, task_id: &str, assigned_to: Option<&str>) -> Result<()> {
        let task_id = task_id.to_string();
        let assigned_to = assigned_to.map(str::to_string);
        self.writes
            .submit(move |pool| {
                let task_id = task_id.clone();
                let assigned_to = assigned_to.clone();
                async move {
                    let result = sqlx::query("UPDATE tasks SET assigned_to = $2, updated_at = now() WHERE task_id = $1")
                        .bind(&task_id)
                        .bind(&assigned_to)
                        .execute(&pool)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(SpiralError::NotFound(format!("task not found: {task_id}")));
                    }
                    Ok(())
                }
            })
            .await
    }

    /// Patches the mutable descriptive fields of a task in one write.
    /// `None` leaves a field untouched; there is no way to clear
    /// `description` or `due_date` back to null through this path other
    /// than `update_task_fields` itself being called with an explicit
    /// `Some(None)` wrapper, which callers express via the task model.
    pub async fn update_task_fields(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.writes
            .submit(move |pool| {
                let task = task.clone();
                async move {
                    let tags: Vec<String> = task.tags.into_iter().collect();
                    let result = sqlx::query(
                        "UPDATE tasks SET title = $2, description = $3, priority = $4, tags = $5,
                                            due_date = $6, metadata = $7, depends_on_tasks = $8,
                                            parent_task = $9, updated_at = now()
                         WHERE task_id = $1",
                    )
                    .bind(&task.task_id)
                    .bind(&task.title)
                    .bind(&task.description)
                    .bind(priority_str(&task.priority))
                    .bind(serde_json::to_value(&tags)?)
                    .bind(task.due_date)
                    .bind(serde_json::to_value(&task.metadata)?)
                    .bind(serde_json::to_value(&task.depends_on_tasks)?)
                    .bind(&task.parent_task)
                    .execute(&pool)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(SpiralError::NotFound(format!("task not found: {}", task.task_id)));
                    }
                    Ok(())
                }
            })
            .await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let task_id = task_id.to_string();
        self.writes
            .submit(move |pool| {
                let task_id = task_id.clone();
                async move {
                    let result = sqlx::query("DELETE FROM tasks WHERE task_id = $1")
                        .bind(&task_id)
                        .execute(&pool)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(SpiralError::NotFound(format!("task not found: {task_id}")));
                    }
                    Ok(())
                }
            })
            .await
    }

    // ---------------------------------------------------------------
    // Context
    // ---------------------------------------------------------------

    pub async fn set_context(&self, entry: ContextEntry) -> Result<()> {
        self.writes
            .submit(move |pool| {
                let entry = entry.clone();
                async move {
                    let mut tx = pool.begin().await?;
                    sqlx::query(
                        "INSERT INTO context_entries (context_key, value, description, updated_by, updated_at)
                         VALUES ($1,$2,$3,$4,$5)
                         ON CONFLICT (context_key) DO UPDATE SET value = $2, description = $3, updated_by = $4, updated_at = $5",
                    )
                    .bind(&entry.context_key)
                    .bind(&entry.value)
                    .bind(&entry.description)
                    .bind(&entry.updated_by)
                    .bind(entry.updated_at)
                    .execute(&mut *tx)
                    .await?;
                    sqlx::query(
                        "INSERT INTO context_history (context_key, value, updated_by, updated_at) VALUES ($1,$2,$3,$4)",
                    )
                    .bind(&entry.context_key)
                    .bind(&entry.value)
                    .bind(&entry.updated_by)
                    .bind(entry.updated_at)
                    .execute(&mut *tx)
                    .await?;
                    tx.commit().await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn get_context(&self, key: &str) -> Result<Option<ContextEntry>> {
        let row = sqlx::query_as::<_, ContextRow>("SELECT * FROM context_entries WHERE context_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_context(&self) -> Result<Vec<ContextEntry>> {
        let rows = sqlx::query_as::<_, ContextRow>("SELECT * FROM context_entries ORDER BY context_key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_history(&self, key: &str) -> Result<Vec<ContextHistoryRow>> {
        let rows = sqlx::query_as::<_, ContextHistoryRow>(
            "SELECT context_key, value, updated_by, updated_at FROM context_history
             WHERE context_key = $1 ORDER BY updated_at DESC",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ---------------------------------------------------------------
    // File claims
    // ---------------------------------------------------------------

    pub async fn claim_file(&self, file_path: &str, agent_id: &str) -> Result<()> {
        let file_path = file_path.to_string();
        let agent_id = agent_id.to_string();
        self.writes
            .submit(move |pool| {
                let file_path = file_path.clone();
                let agent_id = agent_id.clone();
                async move {
                    let existing: Option<(String,)> =
                        sqlx::query_as("SELECT agent_id FROM file_claims WHERE file_path = $1")
                            .bind(&file_path)
                            .fetch_optional(&pool)
                            .await?;
                    if let Some((holder,)) = existing {
                        if holder != agent_id {
                            return Err(SpiralError::Conflict(format!(
                                "{file_path} is already claimed by {holder}"
                            )));
                        }
                        return Ok(());
                    }
                    sqlx::query("INSERT INTO file_claims (file_path, agent_id) VALUES ($1, $2)")
                        .bind(&file_path)
                        .bind(&agent_id)
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn release_file(&self, file_path: &str, agent_id: &str) -> Result<()> {
        let file_path = file_path.to_string();
        let agent_id = agent_id.to_string();
        self.writes
            .submit(move |pool| {
                let file_path = file_path.clone();
                let agent_id = agent_id.clone();
                async move {
                    let result = sqlx::query("DELETE FROM file_claims WHERE file_path = $1 AND agent_id = $2")
                        .bind(&file_path)
                        .bind(&agent_id)
                        .execute(&pool)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(SpiralError::NotFound(format!("no claim on {file_path} held by {agent_id}")));
                    }
                    Ok(())
                }
            })
            .await
    }

    pub async fn get_claim(&self, file_path: &str) -> Result<Option<FileClaim>> {
        let row = sqlx::query_as::<_, FileClaimRow>("SELECT * FROM file_claims WHERE file_path = $1")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_claims_for_agent(&self, agent_id: &str) -> Result<Vec<FileClaim>> {
        let rows = sqlx::query_as::<_, FileClaimRow>("SELECT * FROM file_claims WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ---------------------------------------------------------------
    // Agent messages
    // ---------------------------------------------------------------

    pub async fn insert_message(&self, message: AgentMessage) -> Result<()> {
        self.writes
            .submit(move |pool| {
                let message = message.clone();
                async move {
                    sqlx::query(
                        "INSERT INTO agent_messages (message_id, from_agent, to_agent, payload, sent_at, read_at)
                         VALUES ($1,$2,$3,$4,$5,$6)",
                    )
                    .bind(&message.message_id)
                    .bind(&message.from_agent)
                    .bind(&message.to_agent)
                    .bind(&message.payload)
                    .bind(message.sent_at)
                    .bind(message.read_at)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await
    }

    pub async fn inbox_for(&self, agent_id: &str) -> Result<Vec<AgentMessage>> {
        let rows = sqlx::query_as::<_, AgentMessageRow>(
            "SELECT * FROM agent_messages WHERE to_agent = $1 OR to_agent IS NULL ORDER BY sent_at",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every message ever sent, oldest first -- used by the RAG indexer
    /// to index message payloads alongside markdown/code/task/context.
    pub async fn list_messages(&self) -> Result<Vec<AgentMessage>> {
        let rows = sqlx::query_as::<_, AgentMessageRow>("SELECT * FROM agent_messages ORDER BY sent_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ---------------------------------------------------------------
    // RAG
    // ---------------------------------------------------------------

    pub async fn chunk_exists(&self, source_ref: &str, content_hash: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT chunk_id FROM rag_chunks WHERE source_ref = $1 AND content_hash = $2")
                .bind(source_ref)
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn insert_chunk_with_embedding(&self, chunk: RagChunk, embedding: Embedding) -> Result<()> {
        self.writes
            .submit(move |pool| {
                let chunk = chunk.clone();
                let embedding = embedding.clone();
                async move {
                    let mut tx = pool.begin().await?;
                    sqlx::query(
                        "INSERT INTO rag_chunks (chunk_id, source_type, source_ref, text, content_hash, created_at)
                         VALUES ($1,$2,$3,$4,$5,$6)
                         ON CONFLICT (source_ref, content_hash) DO NOTHING",
                    )
                    .bind(&chunk.chunk_id)
                    .bind(source_type_str(&chunk.source_type))
                    .bind(&chunk.source_ref)
                    .bind(&chunk.text)
                    .bind(&chunk.content_hash)
                    .bind(chunk.created_at)
                    .execute(&mut *tx)
                    .await?;
                    sqlx::query("INSERT INTO rag_embeddings (chunk_id, vector) VALUES ($1, $2)")
                        .bind(&chunk.chunk_id)
                        .bind(pgvector::Vector::from(embedding.0))
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await?;
                    Ok(())
                }
            })
            .await
    }

    /// Every distinct `source_ref` currently chunked, used by the indexer
    /// to detect sources that disappeared since the last cycle.
    pub async fn distinct_chunk_source_refs(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT source_ref FROM rag_chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(r,)| r).collect())
    }

    pub async fn delete_chunks_for_source(&self, source_ref: &str) -> Result<()> {
        let source_ref = source_ref.to_string();
        self.writes
            .submit(move |pool| {
                let source_ref = source_ref.clone();
                async move {
                    sqlx::query("DELETE FROM rag_chunks WHERE source_ref = $1")
                        .bind(&source_ref)
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    /// Cosine-similarity search via pgvector's `<=>` operator, with a
    /// deterministic tie-break on recency then source-ref length.
    pub async fn similarity_search(&self, query: Embedding, top_k: usize) -> Result<Vec<(RagChunk, f32)>> {
        let rows = sqlx::query_as::<_, RagSimilarityRow>(
            "SELECT c.chunk_id, c.source_type, c.source_ref, c.text, c.content_hash, c.created_at,
                    (1 - (e.vector <=> $1)) AS similarity
             FROM rag_chunks c JOIN rag_embeddings e ON c.chunk_id = e.chunk_id
             ORDER BY similarity DESC, c.created_at DESC, length(c.source_ref) ASC
             LIMIT $2",
        )
        .bind(pgvector::Vector::from(query.0))
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn get_meta(&self) -> Result<RagMeta> {
        let row: Option<(Option<DateTime<Utc>>, serde_json::Value)> =
            sqlx::query_as("SELECT last_walk_at, cursors FROM rag_meta WHERE id = true")
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((last_walk_at, cursors)) => Ok(RagMeta {
                last_walk_at,
                cursors: serde_json::from_value(cursors).map_err(SpiralError::Serialization)?,
            }),
            None => Ok(RagMeta::default()),
        }
    }

    pub async fn set_meta(&self, meta: RagMeta) -> Result<()> {
        self.writes
            .submit(move |pool| {
                let meta = meta.clone();
                async move {
                    let cursors = serde_json::to_value(&meta.cursors).map_err(SpiralError::Serialization)?;
                    sqlx::query(
                        "INSERT INTO rag_meta (id, last_walk_at, cursors) VALUES (true, $1, $2)
                         ON CONFLICT (id) DO UPDATE SET last_walk_at = $1, cursors = $2",
                    )
                    .bind(meta.last_walk_at)
                    .bind(cursors)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, token: &str, subject: &str) -> Result<()> {
        let token = token.to_string();
        let subject = subject.to_string();
        self.writes
            .submit(move |pool| {
                let token = token.clone();
                let subject = subject.clone();
                async move {
                    sqlx::query("INSERT INTO tokens (token, subject) VALUES ($1, $2)")
                        .bind(&token)
                        .bind(&subject)
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }

    async fn lookup_token(&self, token: &str) -> Result<Option<(String, Option<DateTime<Utc>>)>> {
        let row: Option<(String, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT subject, revoked_at FROM tokens WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn revoke_token(&self, token: &str) -> Result<bool> {
        let token = token.to_string();
        let pool = self.pool.clone();
        let result = sqlx::query("UPDATE tokens SET revoked_at = now() WHERE token = $1 AND revoked_at IS NULL")
            .bind(&token)
            .execute(&pool)
            .await
            .map_err(SpiralError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_tokens_for_subject(&self, subject: &str) -> Result<()> {
        let subject = subject.to_string();
        self.writes
            .submit(move |pool| {
                let subject = subject.clone();
                async move {
                    sqlx::query("UPDATE tokens SET revoked_at = now() WHERE subject = $1 AND revoked_at IS NULL")
                        .bind(&subject)
                        .execute(&pool)
                        .await?;
                    Ok(())
                }
            })
            .await
    }
}

#[async_trait]
impl crate::auth::AuditSink for PgStore {
    /// Best-effort: a failed audit write is logged, never propagated --
    /// the call it's describing has already succeeded or failed on its
    /// own terms by the time this runs.
    async fn record(&self, entry: crate::auth::AuditEntry) {
        let result = self
            .writes
            .submit(move |pool| {
                let entry = entry.clone();
                async move {
                    sqlx::query(
                        "INSERT INTO audit_log (subject, tool, request_id, ts, success, error_kind)
                         VALUES ($1,$2,$3,$4,$5,$6)",
                    )
                    .bind(&entry.subject)
                    .bind(&entry.tool)
                    .bind(&entry.request_id)
                    .bind(entry.ts)
                    .bind(entry.success)
                    .bind(&entry.error_kind)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await;
        if let Err(e) = result {
            tracing::warn!("failed to persist audit row: {e}");
        }
    }
}

// ---------------------------------------------------------------------
// Row <-> domain conversions
// ---------------------------------------------------------------------

fn status_str(status: &AgentStatus) -> &'static str {
    match status {
        AgentStatus::Created => "created",
        AgentStatus::Active => "active",
        AgentStatus::Terminated => "terminated",
    }
}

fn priority_str(priority: &Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

fn source_type_str(source_type: &SourceType) -> &'static str {
    match source_type {
        SourceType::Markdown => "markdown",
        SourceType::Code => "code",
        SourceType::Context => "context",
        SourceType::Task => "task",
        SourceType::Message => "message",
    }
}

#[derive(sqlx::FromRow)]
struct RagSimilarityRow {
    chunk_id: String,
    source_type: String,
    source_ref: String,
    text: String,
    content_hash: String,
    created_at: DateTime<Utc>,
    similarity: f32,
}

impl TryFrom<RagSimilarityRow> for (RagChunk, f32) {
    type Error = SpiralError;
    fn try_from(row: RagSimilarityRow) -> Result<Self> {
        let chunk = RagChunk {
            chunk_id: row.chunk_id,
            source_type: SourceType::from_str(&row.source_type).map_err(|e| SpiralError::Internal(anyhow::anyhow!(e)))?,
            source_ref: row.source_ref,
            text: row.text,
            content_hash: row.content_hash,
            created_at: row.created_at,
        };
        Ok((chunk, row.similarity))
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    agent_id: String,
    capabilities: serde_json::Value,
    status: String,
    current_task: Option<String>,
    working_directory: String,
    role: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = SpiralError;
    fn try_from(row: AgentRow) -> Result<Self> {
        let capabilities: HashSet<String> = serde_json::from_value(row.capabilities)?;
        Ok(Agent {
            agent_id: row.agent_id,
            token: String::new(),
            capabilities,
            status: AgentStatus::from_str(&row.status).map_err(|e| SpiralError::Internal(anyhow::anyhow!(e)))?,
            current_task: row.current_task,
            working_directory: row.working_directory,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    created_by: String,
    assigned_to: Option<String>,
    parent_task: Option<String>,
    depends_on_tasks: serde_json::Value,
    tags: serde_json::Value,
    display_order: i64,
    due_date: Option<chrono::NaiveDate>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = SpiralError;
    fn try_from(row: TaskRow) -> Result<Self> {
        let tags: HashSet<String> = serde_json::from_value(row.tags)?;
        let depends_on_tasks: Vec<String> = serde_json::from_value(row.depends_on_tasks)?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(row.metadata)?;
        Ok(Task {
            task_id: row.task_id,
            title: row.title,
            description: row.description,
            status: TaskStatus::from_str(&row.status).map_err(|e| SpiralError::Internal(anyhow::anyhow!(e)))?,
            priority: Priority::from_str(&row.priority).map_err(|e| SpiralError::Internal(anyhow::anyhow!(e)))?,
            created_by: row.created_by,
            assigned_to: row.assigned_to,
            parent_task: row.parent_task,
            depends_on_tasks,
            tags,
            display_order: row.display_order,
            due_date: row.due_date,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ContextRow {
    context_key: String,
    value: serde_json::Value,
    description: Option<String>,
    updated_by: String,
    updated_at: DateTime<Utc>,
}

impl From<ContextRow> for ContextEntry {
    fn from(row: ContextRow) -> Self {
        ContextEntry {
            context_key: row.context_key,
            value: row.value,
            description: row.description,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileClaimRow {
    file_path: String,
    agent_id: String,
    claimed_at: DateTime<Utc>,
}

impl From<FileClaimRow> for FileClaim {
    fn from(row: FileClaimRow) -> Self {
        FileClaim { file_path: row.file_path, agent_id: row.agent_id, claimed_at: row.claimed_at }
    }
}

#[derive(sqlx::FromRow)]
struct AgentMessageRow {
    message_id: String,
    from_agent: String,
    to_agent: Option<String>,
    payload: serde_json::Value,
    sent_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl From<AgentMessageRow> for AgentMessage {
    fn from(row: AgentMessageRow) -> Self {
        AgentMessage {
            message_id: row.message_id,
            from_agent: row.from_agent,
            to_agent: row.to_agent,
            payload: row.payload,
            sent_at: row.sent_at,
            read_at: row.read_at,
        }
    }
}
