//! Wiring of backends and the pipeline from configuration

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vigil_bus::create_bus;
use vigil_core::{Config, StatusStoreBackend};
use vigil_db::create_status_store;
use vigil_services::{create_storage, ClamAVService, Pipeline};
use vigil_worker::BackoffConfig;

/// Connect to PostgreSQL and apply pending migrations
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required when STATUS_STORE=postgres")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Build every backend named by `config` and wire them into a [`Pipeline`]
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let pool = match config.status_store {
        StatusStoreBackend::Postgres => Some(setup_database(config).await?),
        StatusStoreBackend::Memory => None,
    };
    let store = create_status_store(config.status_store, pool)?;

    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize object storage")?;
    let bus = create_bus(&config.bus).context("Failed to initialize message bus")?;

    let clamav = ClamAVService::from_config(&config.clamav);
    match clamav.ping().await {
        Ok(()) => tracing::info!(
            host = %config.clamav.host,
            port = config.clamav.port,
            "ClamAV reachable"
        ),
        // Scans fail as retryable until clamd comes up
        Err(e) => tracing::warn!(
            host = %config.clamav.host,
            port = config.clamav.port,
            error = %e,
            "ClamAV not reachable at startup"
        ),
    }

    let backoff = BackoffConfig::from(&config.retry);
    tracing::info!(
        bus = %config.bus.backend,
        storage = %config.storage.backend,
        status_store = %config.status_store,
        max_attempts = backoff.max_attempts,
        initial_delay_ms = config.retry.initial_delay_ms,
        multiplier = config.retry.multiplier,
        max_delay_ms = config.retry.max_delay_ms,
        "Pipeline configured"
    );

    Ok(Pipeline::new(
        bus,
        storage,
        store,
        Arc::new(clamav),
        config.bus.topics.clone(),
        backoff,
    ))
}

pub fn replay_poll_timeout(config: &Config) -> Duration {
    Duration::from_millis(config.dlt_replay_poll_timeout_ms)
}
