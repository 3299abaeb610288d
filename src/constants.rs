//! System-wide configuration values and bounds.
//! Each constant documents the reasoning behind its default so later
//! changes can be weighed against the original trade-off.

// TASK GRAPH

/// Task title bounds (spec: 1-500 chars).
pub const MAX_TITLE_LENGTH: usize = 500;
/// Task description bound (spec: <=10000 chars).
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;
/// Max distinct tags on a task.
pub const MAX_TASK_TAGS: usize = 20;

// QUEUES AND WRITE PATH

/// Bound on the write queue's in-flight channel depth before `submit_write`
/// itself starts applying backpressure to callers.
pub const WRITE_QUEUE_CAPACITY: usize = 4096;
/// Retry bound for a write that hits a transaction conflict (reorder,
/// bulk update) before giving up with `Conflict`.
pub const MAX_WRITE_CONFLICT_RETRIES: u32 = 3;
/// Idempotent-read retry bound on a transient connection error.
pub const MAX_READ_RETRIES: u32 = 3;

// AGENTS

/// Global cap on concurrently registered agents (excluding the admin
/// sentinel), protecting the token table and registry map from unbounded
/// growth.
pub const MAX_AGENTS: usize = 256;
/// Default per-call deadline threaded through `RequestContext`, absent a
/// caller override.
pub const DEFAULT_TOOL_DEADLINE_SECS: u64 = 30;
/// Sentinel id for the always-present admin agent.
pub const ADMIN_AGENT_ID: &str = "admin";
/// Bearer token byte length (before base62 encoding) -- >=128 bits of
/// entropy per the auth module's invariant.
pub const TOKEN_ENTROPY_BYTES: usize = 32;

// SECURITY

/// Default per-string scan budget: strings longer than this are scanned in
/// a single pass but truncated in alert payloads to keep the sink small.
pub const MAX_ALERT_SNIPPET_LENGTH: usize = 200;

// RAG

/// Soft cap, in whitespace-delimited tokens, for a single chunk.
pub const RAG_CHUNK_SOFT_CAP_TOKENS: usize = 800;
/// Sliding-window overlap between consecutive chunks, in tokens.
pub const RAG_CHUNK_OVERLAP_TOKENS: usize = 80;
/// Embeddings requested per provider call during a bulk indexing cycle.
pub const RAG_EMBED_BATCH_SIZE: usize = 16;
/// Hard ceiling on `top_k` regardless of what a caller requests.
pub const RAG_MAX_TOP_K: usize = 50;
/// `top_k` used by `ask_project_rag` when the caller omits it.
pub const RAG_DEFAULT_TOP_K: usize = 13;
/// Below this similarity-derived confidence, skip synthesis entirely.
pub const RAG_LOW_CONFIDENCE_THRESHOLD: f32 = 0.5;

// CONTEXT STORE

/// Serialized JSON byte cap for a single context value.
pub const MAX_CONTEXT_VALUE_BYTES: usize = 64 * 1024;
/// Context key length bound.
pub const MAX_CONTEXT_KEY_LENGTH: usize = 100;

// LIFECYCLE

/// Write-queue drain deadline on shutdown before the process exits anyway.
pub const SHUTDOWN_DRAIN_TIMEOUT_SECS: u64 = 10;
/// Session monitor sweep interval.
pub const SESSION_MONITOR_INTERVAL_SECS: u64 = 60;
/// An agent idle for this many multiples of `AGENT_TIMEOUT_SECONDS` is
/// considered abandoned by the session monitor.
pub const ABANDONED_AGENT_TIMEOUT_MULTIPLE: u32 = 20;
