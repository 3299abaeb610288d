//! Schema bootstrap. Run once at startup via [`super::run_migrations`];
//! idempotent so repeated starts against an existing database are safe.

pub const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS agents (
    agent_id          TEXT PRIMARY KEY,
    capabilities      JSONB NOT NULL DEFAULT '[]',
    status            TEXT NOT NULL,
    current_task      TEXT,
    working_directory TEXT NOT NULL,
    role              TEXT,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS tokens (
    token      TEXT PRIMARY KEY,
    subject    TEXT NOT NULL,
    issued_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    revoked_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_tokens_subject ON tokens (subject);

CREATE TABLE IF NOT EXISTS audit_log (
    id         BIGSERIAL PRIMARY KEY,
    subject    TEXT NOT NULL,
    tool       TEXT NOT NULL,
    request_id TEXT NOT NULL,
    ts         TIMESTAMPTZ NOT NULL DEFAULT now(),
    success    BOOLEAN NOT NULL,
    error_kind TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_log_request_id ON audit_log (request_id);

CREATE TABLE IF NOT EXISTS tasks (
    task_id          TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    description      TEXT,
    status           TEXT NOT NULL,
    priority         TEXT NOT NULL,
    created_by       TEXT NOT NULL,
    assigned_to      TEXT,
    parent_task      TEXT REFERENCES tasks (task_id),
    depends_on_tasks JSONB NOT NULL DEFAULT '[]',
    tags             JSONB NOT NULL DEFAULT '[]',
    display_order    BIGINT NOT NULL DEFAULT 0,
    due_date         DATE,
    metadata         JSONB NOT NULL DEFAULT '{}',
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks (parent_task);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks (assigned_to);

CREATE TABLE IF NOT EXISTS context_entries (
    context_key TEXT PRIMARY KEY,
    value       JSONB NOT NULL,
    description TEXT,
    updated_by  TEXT NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS context_history (
    id          BIGSERIAL PRIMARY KEY,
    context_key TEXT NOT NULL,
    value       JSONB NOT NULL,
    updated_by  TEXT NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_context_history_key ON context_history (context_key, updated_at DESC);

CREATE TABLE IF NOT EXISTS file_claims (
    file_path  TEXT PRIMARY KEY,
    agent_id   TEXT NOT NULL REFERENCES agents (agent_id),
    claimed_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_file_claims_agent ON file_claims (agent_id);

CREATE TABLE IF NOT EXISTS agent_messages (
    message_id TEXT PRIMARY KEY,
    from_agent TEXT NOT NULL,
    to_agent   TEXT,
    payload    JSONB NOT NULL,
    sent_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    read_at    TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_agent_messages_to ON agent_messages (to_agent, read_at);

CREATE TABLE IF NOT EXISTS rag_chunks (
    chunk_id      TEXT PRIMARY KEY,
    source_type   TEXT NOT NULL,
    source_ref    TEXT NOT NULL,
    text          TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (source_ref, content_hash)
);

CREATE TABLE IF NOT EXISTS rag_embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES rag_chunks (chunk_id) ON DELETE CASCADE,
    vector   vector NOT NULL
);

CREATE TABLE IF NOT EXISTS rag_meta (
    id            BOOLEAN PRIMARY KEY DEFAULT true CHECK (id),
    last_walk_at  TIMESTAMPTZ,
    cursors       JSONB NOT NULL DEFAULT '{}'
);
"#;
