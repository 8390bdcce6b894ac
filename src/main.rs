use std::{sync::Arc, time::Duration};

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing_subscriber::EnvFilter;

use isovault::{
    auth::jwt::JwtService,
    config::AppConfig,
    crypto::FileVault,
    db,
    drive::GoogleDriveConnector,
    mailer::Mailer,
    repo::DieselRepository,
    routes::create_router,
    sharelink::ShareLinkService,
    state::AppState,
    sync::{scheduler::SyncScheduler, SyncEngine},
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        sync_interval_secs = config.sync_interval_secs,
        mail_enabled = config.smtp_host.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    run_migrations(&pool)?;

    let jwt = JwtService::from_config(&config)?;
    let vault = Arc::new(FileVault::new(
        &config.file_encryption_key,
        config.cache_dir.clone(),
    )?);
    let share_links = ShareLinkService::new(&config.share_link_secret);

    let connector = Arc::new(GoogleDriveConnector::new(
        config.google_client_id.clone().unwrap_or_default(),
        config.google_client_secret.clone().unwrap_or_default(),
        Duration::from_secs(config.drive_request_timeout_secs),
    )?);
    let mailer = Mailer::from_config(&config)?.map(Arc::new);
    let repo = Arc::new(DieselRepository::new(pool.clone()));
    let engine = Arc::new(SyncEngine::new(repo, connector, vault.clone(), mailer));
    let scheduler = Arc::new(SyncScheduler::new(
        engine,
        Duration::from_secs(config.sync_interval_secs),
    ));

    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.start_all().await;
        });
    }

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(pool, config, jwt, vault, share_links, scheduler);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn run_migrations(pool: &db::PgPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
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
