//! orchestratord - Unified Compute Orchestrator daemon entry point.

use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use orchestrator::{Orchestrator, OrchestratorConfig};

#[derive(Parser, Debug)]
#[command(name = "orchestratord", about = "Unified compute orchestrator daemon")]
struct Args {
    /// Path to a YAML config file; falls back to `.orchestrator.yml`, the
    /// user config dir, then compiled-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let args = Args::parse();
    let config = OrchestratorConfig::load(args.config.as_ref()).context("failed to load configuration")?;

    info!(
        max_concurrent_tasks = config.concurrency.max_concurrent_tasks,
        pool_size = config.container.pool_size,
        "orchestratord starting"
    );

    let orchestrator = Orchestrator::new(config);
    orchestrator.start().await;

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    orchestrator.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
