// Outbox worker
//
// Runs the outbox scheduler against PostgreSQL until Ctrl-C.

mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use fleetops_outbox::prelude::*;

use crate::config::WorkerConfig;
use crate::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Local development: pick up .env before reading any configuration
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    init_telemetry(&TelemetryConfig::from_env());

    tracing::info!("fleetops-outbox-worker starting...");

    let config = WorkerConfig::from_env()?;
    let processor_config = ProcessorConfig::from_env();

    tracing::info!(
        enabled = processor_config.enabled,
        interval_ms = processor_config.interval.as_millis() as u64,
        batch_size = processor_config.batch_size,
        max_attempts = processor_config.backoff.max_attempts,
        scheduler_period_ms = config.scheduler_period.as_millis() as u64,
        "Loaded outbox configuration"
    );

    if !processor_config.enabled {
        tracing::warn!("Outbox processor is disabled; events will accumulate until it is enabled");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    if config.run_migrations {
        fleetops_outbox::persistence::migrate(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }

    let store = Arc::new(PostgresOutboxStore::new(pool.clone()));
    match store.stats().await {
        Ok(stats) => tracing::info!(
            pending = stats.pending,
            processed = stats.processed,
            failed = stats.failed,
            "Outbox state at startup"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to read outbox stats"),
    }

    let journal = Arc::new(PostgresJournal::new(pool.clone()));
    let dispatcher = Dispatcher::new(EventRegistry::with_default_events(), journal);
    let processor = Arc::new(OutboxProcessor::new(
        store,
        Arc::new(dispatcher),
        processor_config,
    ));

    let scheduler = spawn_scheduler(processor, config.scheduler_period);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    scheduler.shutdown().await;
    pool.close().await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
