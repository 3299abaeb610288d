//! Shared harness for the integration tests in this directory. Every
//! test here needs a live Postgres instance -- there is no in-memory
//! double for `PgStore`, since it talks to the database directly rather
//! than through a swappable trait. Point `DB_HOST`/`DB_NAME`/etc (or
//! rely on the same defaults `Config::load` uses) at a scratch database
//! with no schema yet; `persistence::run_migrations` creates it.
//!
//! Tests are `#[ignore]`d so a plain `cargo test` run (with no database
//! reachable) still passes; run them explicitly with
//! `cargo test -- --ignored` against a real instance.

use spiral_core::agents::AgentManager;
use spiral_core::auth::TokenRegistry;
use spiral_core::config::DatabaseConfig;
use spiral_core::context::ContextStore;
use spiral_core::persistence::{self, PgStore, WriteQueue};
use spiral_core::realtime::ChannelRegistry;
use spiral_core::tasks::TaskStore;
use spiral_core::validation::SecurityPipeline;
use std::env;
use std::sync::Arc;

pub struct Harness {
    pub agents: Arc<AgentManager>,
    pub tasks: Arc<TaskStore>,
    pub context: Arc<ContextStore>,
    pub channels: Arc<ChannelRegistry>,
}

fn database_config() -> DatabaseConfig {
    DatabaseConfig {
        host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("DB_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5432),
        name: env::var("DB_NAME").unwrap_or_else(|_| "spiral_core_test".to_string()),
        user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("DB_PASSWORD").unwrap_or_default(),
        pool_min: 1,
        pool_max: 5,
    }
}

/// Connects, migrates, and wires every store-backed component together
/// the way `lifecycle::start` does, minus the network-facing pieces
/// (API server, RAG provider) these tests don't exercise.
pub async fn harness() -> Harness {
    let pool = persistence::connect(&database_config()).await.expect("database reachable");
    persistence::run_migrations(&pool).await.expect("migrations apply");

    let (write_queue, _join) = WriteQueue::spawn(pool.clone());
    let store = Arc::new(PgStore::new(pool, write_queue));

    let tokens = Arc::new(TokenRegistry::new(store.clone(), "test-admin-token".to_string()));
    let channels = Arc::new(ChannelRegistry::new());
    let security = Arc::new(SecurityPipeline::new(spiral_core::config::SanitizeMode::Neutralize).unwrap());

    let agents = Arc::new(AgentManager::new(store.clone(), tokens, channels.clone(), 50, 3600));
    let tasks = Arc::new(TaskStore::new(store.clone(), channels.clone(), security.clone()));
    let context = Arc::new(ContextStore::new(store, channels.clone(), security));

    Harness { agents, tasks, context, channels }
}

/// Builds a harness whose `TaskStore` blocks on critical-severity input
/// instead of neutralizing it, for the security-block scenario.
pub async fn harness_with_sanitize_mode(mode: spiral_core::config::SanitizeMode) -> Harness {
    let pool = persistence::connect(&database_config()).await.expect("database reachable");
    persistence::run_migrations(&pool).await.expect("migrations apply");

    let (write_queue, _join) = WriteQueue::spawn(pool.clone());
    let store = Arc::new(PgStore::new(pool, write_queue));

    let tokens = Arc::new(TokenRegistry::new(store.clone(), "test-admin-token".to_string()));
    let channels = Arc::new(ChannelRegistry::new());
    let security = Arc::new(SecurityPipeline::new(mode).unwrap());

    let agents = Arc::new(AgentManager::new(store.clone(), tokens, channels.clone(), 50, 3600));
    let tasks = Arc::new(TaskStore::new(store.clone(), channels.clone(), security.clone()));
    let context = Arc::new(ContextStore::new(store, channels.clone(), security));

    Harness { agents, tasks, context, channels }
}
