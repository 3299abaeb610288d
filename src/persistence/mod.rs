//! Connection-pooled Postgres persistence with a single-writer queue.
//!
//! Reads go straight to the pool. Writes are funneled through one
//! dedicated task draining an mpsc channel, so commit ordering and
//! per-entity serialization hold without lock contention against bulk
//! readers. Each submitted write carries a oneshot channel the caller
//! awaits for the outcome.

mod schema;
mod store;
mod write_queue;

pub use store::PgStore;
pub use write_queue::{WriteOp, WriteQueue};

use crate::config::DatabaseConfig;
use crate::{Result, SpiralError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Builds a pool with bounded min/max connections and an acquire timeout
/// that surfaces as `ResourceExhausted` rather than hanging callers.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(config.pool_min)
        .max_connections(config.pool_max)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.connection_string())
        .await
        .map_err(|e| SpiralError::Unavailable(format!("failed to connect to database: {e}")))
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(schema::SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(SpiralError::Database)?;
    Ok(())
}
