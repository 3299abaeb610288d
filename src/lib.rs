//! # Spiral Core
//!
//! Spiral Core is a multi-agent orchestration server built around one
//! tool-call contract: agents and human operators claim files, mutate a
//! shared task graph, and query a project knowledge base through the
//! same dispatcher, reached over either a stdio or a streaming-HTTP
//! JSON-RPC transport.
//!
//! ## Architecture
//!
//! - **Dispatcher**: validates, security-scans, deadlines, and audits
//!   every tool call against a single registry
//! - **Agent Manager**: agent lifecycle, advisory file claims, and
//!   inter-agent messaging
//! - **Task Store**: the task graph, its ordering, and bulk mutation
//! - **Context Store**: key/value project context with history
//! - **RAG Engine**: a background indexer and query-time synthesis over
//!   project sources
//! - **Realtime Fan-out**: websocket subscribers for change events
//!
//! ## Key Features
//!
//! - A tool catalog shared identically across both transports
//! - Prompt-injection scanning at both the input and output boundary
//! - Deadline propagation and panic containment around every tool call
//! - Postgres persistence with a single-writer queue for ordering
//!   guarantees
//!
//! ## Usage
//!
//! The system runs as a standalone service: `spiral_core::lifecycle::start`
//! wires every subsystem together and drives both transports until
//! shutdown.

/// Agent Manager: lifecycle, file claims, inter-agent messaging
pub mod agents;
/// HTTP API server and endpoints
pub mod api;
/// Authentication and authorization
pub mod auth;
/// System configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// Context Store: key/value project context with history
pub mod context;
/// Tool registry and dispatch pipeline
pub mod dispatch;
/// Error types and handling
pub mod error;
/// Startup/shutdown orchestration
pub mod lifecycle;
/// Core data models
pub mod models;
/// System monitoring and metrics
pub mod monitoring;
/// Postgres-backed persistence and the write queue
pub mod persistence;
/// RAG Engine: background indexer and query-time synthesis
pub mod rag;
/// Rate limiting functionality
pub mod rate_limit;
/// Fan-out channels for realtime subscribers
pub mod realtime;
/// Security utilities and prompt-injection scanning
pub mod security;
/// Task Store & Ordering
pub mod tasks;
/// Stdio and streaming-HTTP JSON-RPC transport
pub mod transport;
/// Input validation and sanitization
pub mod validation;

pub use error::{Result, SpiralError};
