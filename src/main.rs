//! Longbox worker daemon
//!
//! Bootstraps the processing core: configuration, logging, database,
//! the orchestrator and its two workers, then recovers any jobs that
//! were persisted before the last shutdown.

use longbox::{core, db};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize logging system based on configuration
    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting Longbox v{}", env!("CARGO_PKG_VERSION"));
    info!(path = ?config.database.path, "Database configuration");

    // Ensure required directories exist
    for dir in [&config.storage.data_dir, &config.storage.cache_dir] {
        if !dir.exists() {
            info!("Creating directory: {:?}", dir);
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow::anyhow!("Failed to create directory {:?}: {}", dir, e))?;
        }
    }

    // Initialize database (runs migrations on open)
    info!("Initializing database...");
    let database = Arc::new(db::DatabaseManager::new(
        &config.database.path,
        config.database.connection_pool_size as u32,
        Duration::from_millis(config.database.busy_timeout),
    )?);
    info!("Database initialized successfully");

    // Wire repositories
    let library_repo = Arc::new(db::LibraryRepository::new(database.clone()));
    let volume_repo = Arc::new(db::VolumeRepository::new(database.clone()));
    let issue_repo = Arc::new(db::IssueRepository::new(database.clone()));
    let rename_jobs = Arc::new(db::RenameJobRepository::new(database.clone()));
    let conversion_jobs = Arc::new(db::ConversionJobRepository::new(database.clone()));

    // Search-side services; the HTTP indexer clients hand their payloads
    // to these through the library API
    let search_cache = Arc::new(core::SearchCache::new(
        config.storage.cache_dir.clone(),
        Duration::from_secs(config.processing.indexer_results_ttl),
        Duration::from_secs(config.processing.metadata_ttl),
    )?);
    let blacklist = Arc::new(core::BlacklistManager::new(Duration::from_secs(
        config.processing.blacklist_ttl,
    )));

    // Processing pipeline
    let processing = Arc::new(core::ProcessingService::new(
        library_repo,
        volume_repo,
        issue_repo.clone(),
        rename_jobs.clone(),
        conversion_jobs.clone(),
    ));

    let rename_queue = processing.register_rename_consumer().await;
    let conversion_queue = processing.register_conversion_consumer().await;

    let rename_worker = Arc::new(core::RenameWorker::new(
        processing.clone(),
        issue_repo.clone(),
        rename_jobs,
    ));
    let convert_worker = Arc::new(core::ConvertWorker::new(
        processing.clone(),
        issue_repo,
        conversion_jobs,
    ));

    tokio::spawn(rename_worker.run(rename_queue));
    tokio::spawn(convert_worker.run(conversion_queue));

    // Put jobs persisted before the last shutdown back on the queues
    let recovered = processing.recover_jobs().await?;
    info!(recovered = recovered, "Job recovery completed");

    // Periodic cache maintenance
    let cache_for_sweep = search_cache.clone();
    let blacklist_for_sweep = blacklist.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(900));
        loop {
            interval.tick().await;
            let cache = cache_for_sweep.clone();
            let purged = tokio::task::spawn_blocking(move || cache.purge_expired())
                .await
                .unwrap_or(0);
            let expired = blacklist_for_sweep.clear_expired();
            if purged > 0 || expired > 0 {
                info!(cache_purged = purged, blacklist_expired = expired, "Maintenance sweep");
            }
        }
    });

    info!("Longbox initialized successfully, workers running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
