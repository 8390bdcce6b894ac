//! Standalone sync daemon: runs the per-tenant timers without the HTTP
//! server, for deployments that separate the API from ingestion.

use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use isovault::{
    config::AppConfig,
    crypto::FileVault,
    db,
    drive::GoogleDriveConnector,
    mailer::Mailer,
    repo::DieselRepository,
    sync::{scheduler::SyncScheduler, SyncEngine},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "scheduler",
        database_url = %config.redacted_database_url(),
        sync_interval_secs = config.sync_interval_secs,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let vault = Arc::new(FileVault::new(
        &config.file_encryption_key,
        config.cache_dir.clone(),
    )?);
    let connector = Arc::new(GoogleDriveConnector::new(
        config.google_client_id.clone().unwrap_or_default(),
        config.google_client_secret.clone().unwrap_or_default(),
        Duration::from_secs(config.drive_request_timeout_secs),
    )?);
    let mailer = Mailer::from_config(&config)?.map(Arc::new);
    let repo = Arc::new(DieselRepository::new(pool));
    let engine = Arc::new(SyncEngine::new(repo, connector, vault, mailer));
    let scheduler = Arc::new(SyncScheduler::new(
        engine,
        Duration::from_secs(config.sync_interval_secs),
    ));

    scheduler.start_all().await;

    signal::ctrl_c().await?;
    tracing::info!("scheduler received shutdown signal");
    scheduler.stop_all().await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
