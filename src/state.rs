use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    crypto::FileVault,
    db::PgPool,
    error::{AppError, AppResult},
    sharelink::ShareLinkService,
    sync::scheduler::SyncScheduler,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub vault: Arc<FileVault>,
    pub share_links: ShareLinkService,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        jwt: JwtService,
        vault: Arc<FileVault>,
        share_links: ShareLinkService,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            vault,
            share_links,
            scheduler,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
