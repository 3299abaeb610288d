//! Startup and shutdown orchestration: wires every subsystem together
//! in dependency order, then waits on both transports until a shutdown
//! signal asks the write queue to drain and everything to stop cleanly.

use crate::agents::AgentManager;
use crate::api::ApiServer;
use crate::auth::{AuthState, TokenRegistry};
use crate::config::Config;
use crate::context::ContextStore;
use crate::dispatch::{tools::build_registry, Dispatcher};
use crate::monitoring::SystemMonitor;
use crate::persistence::{self, PgStore, WriteQueue};
use crate::rag::RagEngine;
use crate::rate_limit::RateLimitRegistry;
use crate::realtime::ChannelRegistry;
use crate::security::generate_token;
use crate::tasks::TaskStore;
use crate::transport::stdio;
use crate::validation::{HttpAlertSink, SecurityPipeline, TracingAlertSink};
use crate::{Result, SpiralError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coarse startup failure classification, used only to pick the
/// process exit code spec.md's operators table assigns each stage.
#[derive(Debug)]
pub enum StartupError {
    Configuration(SpiralError),
    Migration(SpiralError),
    Other(SpiralError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Configuration(e) => write!(f, "configuration error: {e}"),
            StartupError::Migration(e) => write!(f, "migration error: {e}"),
            StartupError::Other(e) => write!(f, "{e}"),
        }
    }
}

/// A fully wired, running system. Dropping this without calling
/// [`RunningSystem::shutdown`] abandons the background tasks; callers
/// should always route through `shutdown` on the way out.
pub struct RunningSystem {
    api: Arc<ApiServer>,
    cancellation: CancellationToken,
    background: Vec<tokio::task::JoinHandle<()>>,
    write_queue_join: tokio::task::JoinHandle<()>,
}

impl RunningSystem {
    /// Runs the API server and stdio transport concurrently until either
    /// exits or `shutdown` is triggered elsewhere. Intended to be awaited
    /// directly from `main`.
    pub async fn serve(&self, dispatcher: Arc<Dispatcher>) -> Result<()> {
        tokio::select! {
            result = self.api.run() => result,
            result = stdio::run(dispatcher) => result,
            _ = self.cancellation.cancelled() => Ok(()),
        }
    }

    /// Cancels background loops, drains the write queue within
    /// `SHUTDOWN_DRAIN_TIMEOUT_SECS`, and waits for every spawned task.
    pub async fn shutdown(self) {
        info!("shutdown requested, draining background tasks");
        self.cancellation.cancel();
        for handle in self.background {
            let _ = handle.await;
        }
        let drain = tokio::time::timeout(
            std::time::Duration::from_secs(crate::constants::SHUTDOWN_DRAIN_TIMEOUT_SECS),
            self.write_queue_join,
        )
        .await;
        if drain.is_err() {
            warn!("write queue did not drain within the shutdown deadline");
        }
        info!("shutdown complete");
    }
}

/// Loads configuration, opens the pool, runs migrations, hydrates every
/// registry, and spawns the background loops. Returns the running
/// system plus the dispatcher `main` hands to both transports.
pub async fn start(config: Config) -> std::result::Result<(RunningSystem, Arc<Dispatcher>), StartupError> {
    let pool = persistence::connect(&config.database).await.map_err(StartupError::Other)?;
    persistence::run_migrations(&pool).await.map_err(StartupError::Migration)?;

    let (write_queue, write_queue_join) = WriteQueue::spawn(pool.clone());
    let store = Arc::new(PgStore::new(pool, write_queue));

    let admin_token = std::env::var("ADMIN_TOKEN").unwrap_or_else(|_| {
        let generated = generate_token();
        warn!("ADMIN_TOKEN not set; generated an ephemeral admin token for this process");
        generated
    });
    let token_registry = Arc::new(TokenRegistry::new(store.clone(), admin_token));
    let auth = Arc::new(AuthState { registry: token_registry.clone() });

    let channels = Arc::new(ChannelRegistry::new());
    let security = Arc::new(if config.security.enabled {
        let alert_sink: Arc<dyn crate::validation::AlertSink> = match &config.security.alert_webhook {
            Some(webhook) => Arc::new(HttpAlertSink::new(webhook.clone())),
            None => Arc::new(TracingAlertSink),
        };
        SecurityPipeline::with_alert_sink(config.security.sanitize_mode, alert_sink).map_err(StartupError::Other)?
    } else {
        warn!("SECURITY_ENABLED=false; the security pipeline is bypassed entirely for this process");
        SecurityPipeline::passthrough().map_err(StartupError::Other)?
    });

    let agents = Arc::new(AgentManager::new(
        store.clone(),
        token_registry,
        channels.clone(),
        config.agents.max_workers,
        config.agents.timeout_seconds,
    ));
    let tasks = Arc::new(TaskStore::new(store.clone(), channels.clone(), security.clone()));
    let context = Arc::new(ContextStore::new(store.clone(), channels.clone(), security.clone()));
    let rag = RagEngine::new(config.rag.clone(), store.clone(), channels.clone()).map(Arc::new);

    let tools = build_registry(agents.clone(), tasks.clone(), context.clone(), rag.clone());
    let audit_sink: Arc<dyn crate::auth::AuditSink> = store.clone();
    let dispatcher =
        Arc::new(Dispatcher::new(tools, security, config.agents.max_workers).with_audit_sink(audit_sink));

    let cancellation = CancellationToken::new();
    let mut background = Vec::new();

    if let Some(rag) = &rag {
        background.push(rag.clone().spawn_indexer_loop(cancellation.clone()));
    }
    background.push(spawn_session_monitor(agents.clone(), cancellation.clone()));

    let monitor = Arc::new(SystemMonitor::new(store.clone(), channels.clone(), rag.clone()));
    let rate_limit = Arc::new(RateLimitRegistry::new());
    let prometheus = PrometheusBuilder::new().install_recorder().map_err(|e| {
        StartupError::Other(SpiralError::ConfigurationError(format!("failed to install metrics recorder: {e}")))
    })?;

    let api = Arc::new(ApiServer::new(config.api.clone(), dispatcher.clone(), auth, rate_limit, channels, monitor, prometheus));

    Ok((RunningSystem { api, cancellation, background, write_queue_join }, dispatcher))
}

/// Periodically prunes idle-too-long agent tokens/sessions so a crashed
/// or disconnected agent doesn't hold a file claim forever.
fn spawn_session_monitor(agents: Arc<AgentManager>, cancellation: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(crate::constants::SESSION_MONITOR_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("session monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = agents.prune_abandoned().await {
                        warn!("session monitor sweep failed: {e}");
                    }
                }
            }
        }
    })
}
