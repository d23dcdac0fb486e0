//! `vigil`: scan workers and operator commands for the upload scanning pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use vigil_cli::setup::{build_pipeline, replay_poll_timeout};
use vigil_cli::workers::{run_workers, WorkerSet};
use vigil_cli::{Cli, Commands};
use vigil_core::Config;
use vigil_infra::{init_telemetry, shutdown_channel, shutdown_signal, shutdown_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Invalid configuration")?;
    init_telemetry(&config.service_name, config.log_json)?;
    tracing::info!(
        environment = %config.environment,
        production = config.is_production(),
        "Configuration loaded"
    );

    let result = execute(cli.command, &config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    shutdown_telemetry().await;
    result
}

async fn execute(command: Commands, config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let admin = || {
        pipeline.admin(
            config.storage.bucket_name(),
            replay_poll_timeout(config),
        )
    };

    match command {
        Commands::ScanWorker { workers } => {
            let workers = workers.unwrap_or(config.consumer_workers);
            let shutdown = shutdown_channel(shutdown_signal());
            run_workers(&pipeline, config, WorkerSet::Scan, workers, shutdown).await?;
        }
        Commands::IngestWorker { workers } => {
            let workers = workers.unwrap_or(config.consumer_workers);
            let shutdown = shutdown_channel(shutdown_signal());
            run_workers(&pipeline, config, WorkerSet::Ingest, workers, shutdown).await?;
        }
        Commands::Run { workers } => {
            let workers = workers.unwrap_or(config.consumer_workers);
            let shutdown = shutdown_channel(shutdown_signal());
            run_workers(&pipeline, config, WorkerSet::Both, workers, shutdown).await?;
        }
        Commands::ReplayDlt => {
            let retried = admin().replay_dead_letters().await?;
            println!("Republished {} dead-lettered upload event(s)", retried);
        }
        Commands::Rescan { key } => {
            let record = admin().rescan(&key).await?;
            println!(
                "Queued {} (file {}) for rescan; status is now {}",
                record.object_key, record.file_id, record.status
            );
        }
        Commands::List { status } => {
            let records = admin().list(status).await?;
            let out = serde_json::to_string_pretty(&records).context("Serialize file records")?;
            println!("{}", out);
        }
        Commands::Stats => {
            let stats = admin().stats().await?;
            let out = serde_json::to_string_pretty(&stats).context("Serialize stats")?;
            println!("{}", out);
        }
        Commands::Purge { status } => {
            let deleted = admin().purge(status).await?;
            println!("Deleted {} file record(s) with status {}", deleted, status);
        }
    }

    Ok(())
}
