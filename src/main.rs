use spiral_core::config::Config;
use spiral_core::lifecycle::{self, StartupError};
use std::process::ExitCode;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_max_level(Level::INFO).init();
            error!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    info!("starting spiral-core");

    let (system, dispatcher) = match lifecycle::start(config).await {
        Ok(started) => started,
        Err(StartupError::Configuration(e)) => {
            error!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
        Err(StartupError::Migration(e)) => {
            error!("migration failed: {e}");
            return ExitCode::from(3);
        }
        Err(StartupError::Other(e)) => {
            error!("startup failed: {e}");
            return ExitCode::from(1);
        }
    };

    let result = tokio::select! {
        result = system.serve(dispatcher) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    };

    system.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server exited with error: {e}");
            ExitCode::from(1)
        }
    }
}
