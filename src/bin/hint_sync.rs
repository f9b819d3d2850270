//! # Hint Sync Server
//!
//! Standalone binary that keeps scan jobs in step with the results queue.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin hint-sync
//!
//! # Run with specific environment
//! HINT_SYNC_ENV=production DATABASE_URL=postgresql://... cargo run --bin hint-sync
//! ```

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use hint_sync::config::ConfigManager;
use hint_sync::database::{PgJobRepository, PgLockCoordinator, MIGRATOR};
use hint_sync::logging;
use hint_sync::messaging::PgmqResultQueue;
use hint_sync::reporting::TracingCrashReporter;
use hint_sync::SyncService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        build_mode = if cfg!(debug_assertions) { "debug" } else { "release" },
        "Starting hint sync server"
    );

    let manager = ConfigManager::load().context("Failed to load configuration")?;
    let config = manager.config();
    config.validate().context("Invalid configuration")?;

    info!(
        environment = %manager.environment(),
        database = %config.database.redacted_url(),
        queue = %config.queue.name,
        "Configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let queue = Arc::new(PgmqResultQueue::new_with_pool(pool.clone(), config.queue.clone()).await);
    let service = SyncService::new(
        queue.clone(),
        Arc::new(PgJobRepository::new(pool.clone())),
        Arc::new(PgLockCoordinator::new(pool.clone(), config.lock.clone())),
        Arc::new(TracingCrashReporter),
        config.sync.clone(),
    );

    service
        .run()
        .await
        .context("Failed to register results handler")?;

    info!("Hint sync server started, press Ctrl+C to shut down");

    shutdown_signal().await;

    info!("Shutdown signal received, stopping listener");
    queue.stop_listening();
    pool.close().await;

    info!("Hint sync server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
