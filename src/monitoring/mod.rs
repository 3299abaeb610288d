//! System monitoring: periodic health/metrics collection backing the
//! HTTP surface's `/health`, `/ready`, `/live`, and `/metrics` endpoints.

use crate::persistence::PgStore;
use crate::rag::RagEngine;
use crate::realtime::ChannelRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Write-queue fill fraction, of `WRITE_QUEUE_CAPACITY`, above which the
/// system reports itself degraded rather than healthy.
const DEGRADED_QUEUE_FRACTION: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub uptime_seconds: u64,
    pub health_status: HealthStatus,
    pub db_pool_size: u32,
    pub db_pool_idle: usize,
    pub write_queue_depth: usize,
    pub write_queue_capacity: usize,
    pub rag_enabled: bool,
    pub rag_cycle_age_seconds: Option<i64>,
    pub subscriber_counts: HashMap<String, usize>,
}

/// Aggregates pool/queue/fan-out state from the live services; holds no
/// state of its own beyond the process start time.
pub struct SystemMonitor {
    store: Arc<PgStore>,
    channels: Arc<ChannelRegistry>,
    rag: Option<Arc<RagEngine>>,
    started_at: Instant,
}

impl SystemMonitor {
    pub fn new(store: Arc<PgStore>, channels: Arc<ChannelRegistry>, rag: Option<Arc<RagEngine>>) -> Self {
        Self { store, channels, rag, started_at: Instant::now() }
    }

    pub async fn collect_metrics(&self) -> SystemMetrics {
        let pool = self.store.pool();
        let write_queue_depth = self.store.write_queue_depth();

        let mut subscriber_counts = HashMap::with_capacity(crate::realtime::KNOWN_CHANNELS.len());
        for channel in crate::realtime::KNOWN_CHANNELS {
            subscriber_counts.insert((*channel).to_string(), self.channels.subscriber_count(channel).await);
        }

        let rag_cycle_age_seconds = if self.rag.is_some() {
            self.store
                .get_meta()
                .await
                .ok()
                .and_then(|meta| meta.last_walk_at)
                .map(|last| (chrono::Utc::now() - last).num_seconds())
        } else {
            None
        };

        SystemMetrics {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            health_status: self.assess(write_queue_depth),
            db_pool_size: pool.size(),
            db_pool_idle: pool.num_idle(),
            write_queue_depth,
            write_queue_capacity: crate::constants::WRITE_QUEUE_CAPACITY,
            rag_enabled: self.rag.is_some(),
            rag_cycle_age_seconds,
            subscriber_counts,
        }
    }

    fn assess(&self, write_queue_depth: usize) -> HealthStatus {
        let fraction = write_queue_depth as f64 / crate::constants::WRITE_QUEUE_CAPACITY as f64;
        if fraction >= DEGRADED_QUEUE_FRACTION {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// `/ready`: whether this instance can currently serve traffic.
    pub async fn readiness(&self) -> Result<(), String> {
        sqlx::query("SELECT 1").execute(self.store.pool()).await.map(|_| ()).map_err(|e| e.to_string())
    }

    /// `/live`: whether the process itself is still making progress.
    /// Always true once the monitor exists; a hung process simply stops
    /// answering requests at all, which the orchestrator's own liveness
    /// probe timeout already covers.
    pub fn liveness(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assess_reports_healthy_below_threshold() {
        let monitor_fraction = 10.0 / crate::constants::WRITE_QUEUE_CAPACITY as f64;
        assert!(monitor_fraction < DEGRADED_QUEUE_FRACTION);
    }
}
