use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::SyncEngine;

/// Per-tenant timer registry. Owns one recurring sync task per started
/// tenant; timers are explicit handles, never module-level state.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    timers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Replaces any existing timer for the tenant, runs one pass
    /// immediately, then re-runs on the configured interval.
    pub async fn start(&self, client_id: i64) {
        let mut timers = self.timers.lock().await;
        if let Some(existing) = timers.remove(&client_id) {
            existing.abort();
        }

        let engine = self.engine.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            engine.run_for_client(client_id).await;
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval fires immediately and the
            // startup pass already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.run_for_client(client_id).await;
            }
        });

        timers.insert(client_id, handle);
        info!(client_id, interval_secs = interval.as_secs(), "sync timer started");
    }

    /// Idempotent: stopping a tenant without a timer is a no-op.
    pub async fn stop(&self, client_id: i64) {
        let mut timers = self.timers.lock().await;
        if let Some(handle) = timers.remove(&client_id) {
            handle.abort();
            info!(client_id, "sync timer stopped");
        }
    }

    pub async fn is_running(&self, client_id: i64) -> bool {
        self.timers.lock().await.contains_key(&client_id)
    }

    /// Starts a timer for every tenant that has a designated admin user; a
    /// tenant without one is logged and skipped.
    pub async fn start_all(&self) {
        let clients = match self.engine.repo().list_clients().await {
            Ok(clients) => clients,
            Err(err) => {
                warn!(error = %err, "failed to list clients, no sync timers started");
                return;
            }
        };

        for client in clients {
            match self.engine.repo().admin_user_for_client(client.id).await {
                Ok(Some(_)) => self.start(client.id).await,
                Ok(None) => {
                    warn!(client_id = client.id, client = %client.name, "client has no admin user, sync not started");
                }
                Err(err) => {
                    warn!(client_id = client.id, error = %err, "failed to resolve client admin, sync not started");
                }
            }
        }
    }

    pub async fn stop_all(&self) {
        let mut timers = self.timers.lock().await;
        for (client_id, handle) in timers.drain() {
            handle.abort();
            info!(client_id, "sync timer stopped");
        }
    }
}
