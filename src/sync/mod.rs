use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crypto::FileVault;
use crate::drive::{extract_folder_id, DriveConnector, DriveCredentials, RemoteFile, RemoteFileStore};
use crate::mailer::Mailer;
use crate::models::{Client, Document, User};
use crate::repo::{DocumentDraft, DocumentRepository};

pub mod alerts;
pub mod filename;
pub mod obsolete;
pub mod scheduler;

use alerts::{AlertOutcome, AlertStatus};
use filename::parse_filename;

/// Aggregate counts for one sync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub listed: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum FileOutcome {
    Ingested(Document),
    Skipped,
}

/// Drives sync passes for tenants. One pass lists the tenant's remote folder
/// tree, ingests files that match the naming convention and are not yet
/// stored, and reconciles revisions. All failures are logged; nothing is
/// surfaced to a caller since passes run unattended.
pub struct SyncEngine {
    repo: Arc<dyn DocumentRepository>,
    connector: Arc<dyn DriveConnector>,
    vault: Arc<FileVault>,
    mailer: Option<Arc<Mailer>>,
    // Serializes passes per tenant so a manual trigger cannot interleave
    // with the scheduled timer for the same tenant.
    pass_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        connector: Arc<dyn DriveConnector>,
        vault: Arc<FileVault>,
        mailer: Option<Arc<Mailer>>,
    ) -> Self {
        Self {
            repo,
            connector,
            vault,
            mailer,
            pass_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn repo(&self) -> &Arc<dyn DocumentRepository> {
        &self.repo
    }

    /// Runs one pass using the tenant's stored folder configuration.
    pub async fn run_for_client(&self, client_id: i64) -> SyncReport {
        let folder = match self.repo.client_by_id(client_id).await {
            Ok(Some(client)) => client.drive_folder_id,
            Ok(None) => {
                warn!(client_id, "sync requested for unknown client");
                return SyncReport::default();
            }
            Err(err) => {
                error!(client_id, error = %err, "failed to load client for sync");
                return SyncReport::default();
            }
        };

        let Some(folder) = folder else {
            warn!(client_id, "client has no drive folder configured, skipping sync");
            return SyncReport::default();
        };

        self.run_sync(&folder, client_id).await
    }

    /// One full sync pass for one tenant. Configuration problems abort the
    /// pass with a log line; per-file problems skip the file and continue.
    pub async fn run_sync(&self, folder_id_or_url: &str, client_id: i64) -> SyncReport {
        let lock = self.pass_lock(client_id).await;
        let _guard = lock.lock().await;

        let pass = match self.prepare_pass(folder_id_or_url, client_id).await {
            Ok(pass) => pass,
            Err(err) => {
                error!(client_id, error = %err, "sync pass aborted");
                return SyncReport::default();
            }
        };

        info!(
            client_id,
            folder = %pass.folder_id,
            "sync pass started"
        );

        let scratch_dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                error!(client_id, error = %err, "failed to create scratch directory");
                return SyncReport::default();
            }
        };

        let files = match self.list_tree(pass.store.as_ref(), &pass.folder_id).await {
            Ok(files) => files,
            Err(err) => {
                error!(client_id, error = %err, "failed to list remote folder tree");
                return SyncReport::default();
            }
        };

        let mut report = SyncReport {
            listed: files.len(),
            ..SyncReport::default()
        };

        // Strictly sequential: the duplicate and obsolescence checks rely on
        // documents created earlier in this same pass being visible.
        for file in &files {
            let scratch = scratch_path(scratch_dir.path(), &file.name);
            let outcome = self
                .process_file(pass.store.as_ref(), &pass, file, &scratch)
                .await;

            if let Err(err) = tokio::fs::remove_file(&scratch).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %scratch.display(), error = %err, "failed to remove scratch file");
                }
            }

            match outcome {
                Ok(FileOutcome::Ingested(document)) => {
                    report.ingested += 1;
                    obsolete::resolve_obsolete(self.repo.as_ref(), &document, pass.owner.id).await;
                }
                Ok(FileOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(
                        client_id,
                        file = %file.name,
                        error = %err,
                        "file ingestion failed, continuing pass"
                    );
                }
            }
        }

        info!(
            client_id,
            listed = report.listed,
            ingested = report.ingested,
            skipped = report.skipped,
            failed = report.failed,
            "sync pass completed"
        );

        if let Err(err) = self
            .repo
            .append_log(
                Some(pass.owner.id),
                "sync_pass",
                None,
                json!({
                    "client_id": client_id,
                    "listed": report.listed,
                    "ingested": report.ingested,
                    "skipped": report.skipped,
                    "failed": report.failed,
                }),
            )
            .await
        {
            error!(client_id, error = %err, "failed to record sync pass in audit log");
        }

        self.refresh_alerts(&pass.client, &pass.owner).await;

        report
    }

    /// Re-checks stored expiry dates against the tenant's warning threshold
    /// and notifies the tenant admin when documents are expiring.
    async fn refresh_alerts(&self, client: &Client, admin: &User) {
        let documents = match self.repo.documents_with_expiry(client.id).await {
            Ok(documents) => documents,
            Err(err) => {
                error!(client_id = client.id, error = %err, "failed to load documents for alert re-check");
                return;
            }
        };

        let today = Utc::now().date_naive();
        let warning_days = i64::from(client.warning_days);
        let mut expired = Vec::new();
        let mut warning = Vec::new();

        for document in documents {
            let Some(expiry) = document.expiry_date else {
                continue;
            };

            // Glyph-forced statuses are authoritative; the date must not
            // overwrite them.
            let status = if document.alert_forced {
                match document.alert_status.as_deref() {
                    Some("expired") => AlertStatus::Expired,
                    Some("warning") => AlertStatus::Warning,
                    _ => AlertStatus::None,
                }
            } else {
                let status = alerts::status_for_expiry(expiry, today, warning_days);
                let stored = document.alert_status.as_deref().unwrap_or("none");
                if stored != status.as_str() {
                    if let Err(err) = self.repo.set_alert_status(document.id, status).await {
                        error!(document_id = document.id, error = %err, "failed to refresh alert status");
                        continue;
                    }
                }
                status
            };

            let line = format!(
                "{} '{}' {} (expires {})",
                document.hierarchical_path,
                document.title,
                document.revision_label(),
                expiry
            );
            match status {
                AlertStatus::Expired => expired.push(line),
                AlertStatus::Warning => warning.push(line),
                AlertStatus::None => {}
            }
        }

        if expired.is_empty() && warning.is_empty() {
            return;
        }

        if let Some(mailer) = &self.mailer {
            if let Err(err) = mailer
                .send_alert_summary(&admin.email, &client.name, &expired, &warning)
                .await
            {
                error!(client_id = client.id, error = %err, "failed to send alert summary mail");
            }
        }
    }

    async fn prepare_pass(&self, folder_id_or_url: &str, client_id: i64) -> Result<PassContext> {
        let client = self
            .repo
            .client_by_id(client_id)
            .await?
            .ok_or_else(|| anyhow!("client {client_id} not found"))?;

        let folder_id = extract_folder_id(folder_id_or_url)
            .ok_or_else(|| anyhow!("'{folder_id_or_url}' is not a folder id or known drive URL"))?;

        let access_token = client
            .access_token
            .clone()
            .ok_or_else(|| anyhow!("client {client_id} has no stored drive credentials"))?;
        let credentials = DriveCredentials {
            access_token,
            refresh_token: client.refresh_token.clone(),
            token_expiry: client.token_expiry,
        };

        let owner = self
            .repo
            .admin_user_for_client(client_id)
            .await?
            .ok_or_else(|| anyhow!("client {client_id} has no admin user"))?;

        let (store, refreshed) = self
            .connector
            .connect(credentials.clone())
            .await
            .context("failed to connect to remote file store")?;

        if refreshed.access_token != credentials.access_token {
            self.repo
                .update_client_credentials(client_id, &refreshed)
                .await
                .context("failed to persist refreshed drive credentials")?;
        }

        Ok(PassContext {
            client,
            owner,
            folder_id,
            store,
        })
    }

    /// Breadth-first traversal of the folder tree. Folder entries are
    /// expanded and excluded from the returned file list.
    async fn list_tree(
        &self,
        store: &dyn RemoteFileStore,
        root_folder_id: &str,
    ) -> Result<Vec<RemoteFile>> {
        let mut queue = vec![root_folder_id.to_string()];
        let mut files = Vec::new();

        while let Some(folder_id) = queue.pop() {
            let entries = store
                .list_files(&folder_id)
                .await
                .with_context(|| format!("failed to list folder {folder_id}"))?;
            for entry in entries {
                if entry.is_folder() {
                    queue.insert(0, entry.id);
                } else {
                    files.push(entry);
                }
            }
        }

        Ok(files)
    }

    async fn process_file(
        &self,
        store: &dyn RemoteFileStore,
        pass: &PassContext,
        file: &RemoteFile,
        scratch: &Path,
    ) -> Result<FileOutcome> {
        let Some(parsed) = parse_filename(&file.name) else {
            return Ok(FileOutcome::Skipped);
        };

        let revision = i32::try_from(parsed.revision)
            .map_err(|_| anyhow!("revision {} out of range", parsed.revision))?;

        store
            .download_file(file, scratch)
            .await
            .with_context(|| format!("download of {} failed", file.name))?;

        let alert = self.classify(scratch, &parsed.file_type).await?;

        let existing = self
            .repo
            .find_document_by_path_title_revision(
                Some(pass.client.id),
                &parsed.hierarchical_path,
                &parsed.title,
                revision,
            )
            .await?;
        if existing.is_some() {
            return Ok(FileOutcome::Skipped);
        }

        let bytes = tokio::fs::read(scratch)
            .await
            .with_context(|| format!("failed to read scratch file for {}", file.name))?;
        let (cache_path, integrity_hash) = {
            let vault = self.vault.clone();
            task::spawn_blocking(move || vault.store(&bytes))
                .await
                .context("encryption task panicked")??
        };

        let source_url = file
            .view_url
            .clone()
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));

        let draft = DocumentDraft {
            title: parsed.title.clone(),
            hierarchical_path: parsed.hierarchical_path.clone(),
            revision,
            source_url,
            file_type: parsed.file_type.clone(),
            alert_status: Some(alert.status),
            alert_forced: alert.forced,
            expiry_date: alert.expiry_date,
            integrity_hash: Some(integrity_hash),
            encrypted_cache_path: Some(cache_path.to_string_lossy().into_owned()),
            client_id: Some(pass.client.id),
            owner_id: pass.owner.id,
        };

        let document = self.repo.create_document(draft).await?;

        if let Err(err) = self
            .repo
            .append_log(
                Some(pass.owner.id),
                "document_ingested",
                Some(document.id),
                json!({
                    "title": document.title,
                    "revision": document.revision,
                    "hierarchical_path": document.hierarchical_path,
                    "file": file.name,
                }),
            )
            .await
        {
            error!(document_id = document.id, error = %err, "failed to log ingestion");
        }

        info!(
            document_id = document.id,
            title = %document.title,
            revision = document.revision,
            "document ingested"
        );

        Ok(FileOutcome::Ingested(document))
    }

    // Ingestion classifies against the fixed default window; the tenant's
    // custom threshold only applies to the per-pass re-check.
    async fn classify(&self, scratch: &Path, file_type: &str) -> Result<AlertOutcome> {
        if !alerts::is_spreadsheet(file_type) {
            return Ok(AlertOutcome::none());
        }

        let path = scratch.to_path_buf();
        let file_type = file_type.to_string();
        let today = Utc::now().date_naive();
        task::spawn_blocking(move || {
            alerts::classify_file(&path, &file_type, today, alerts::DEFAULT_WARNING_DAYS)
        })
        .await
        .context("alert classification task panicked")
    }

    async fn pass_lock(&self, client_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.pass_locks.lock().await;
        locks
            .entry(client_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

struct PassContext {
    client: Client,
    owner: User,
    folder_id: String,
    store: Arc<dyn RemoteFileStore>,
}

fn scratch_path(dir: &Path, original_name: &str) -> PathBuf {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("bin");
    dir.join(format!("{}.{}", Uuid::new_v4(), extension))
}
