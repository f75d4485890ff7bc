//! Cadence Server - Main entry point
//!
//! Runs the scheduler loop and timeout sweep over the in-memory store.

use clap::Parser;
use std::sync::Arc;

use cadence_core::{
    clock::SystemClock,
    config::Config,
    coordinator::ExecutionCoordinator,
    runner::DispatchRunner,
    scheduler::SchedulerLoop,
    service::{JobService, NewJob},
    store::InMemoryJobStore,
    telemetry::{describe_metrics, init_logging},
};

#[derive(Parser)]
#[command(name = "cadence-server")]
#[command(author, version, about = "Cadence scheduling server", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON); environment variables override it
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    init_logging(&config.logging, &config.environment)?;
    describe_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting Cadence Server"
    );

    let store = Arc::new(InMemoryJobStore::new());
    let coordinator = Arc::new(
        ExecutionCoordinator::new(
            store,
            Arc::new(DispatchRunner::standard(&config.runner)),
            Arc::new(SystemClock),
        )
        .with_backoff(config.retry.backoff()),
    );
    let service = JobService::new(Arc::clone(&coordinator)).with_health_policy(config.health.policy());

    for seed in config.jobs.clone() {
        let name = seed.name.clone();
        match service.create_job(NewJob::from(seed)).await {
            Ok(job) => tracing::info!(job_id = %job.id(), job_name = %job.name(), "Seeded job"),
            Err(e) => tracing::error!(job_name = %name, error = %e, "Could not seed job"),
        }
    }

    let scheduler = Arc::new(SchedulerLoop::new(coordinator, config.scheduler.clone()));
    let handle = scheduler.start();

    shutdown_signal().await;
    handle.stop().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
