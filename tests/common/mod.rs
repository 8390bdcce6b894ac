#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tempfile::TempDir;

use isovault::crypto::FileVault;
use isovault::drive::{
    DriveConnector, DriveCredentials, RemoteFile, RemoteFileStore, FOLDER_MIME,
};
use isovault::models::{Client, Document, User, ROLE_ADMIN};
use isovault::repo::{DocumentDraft, DocumentRepository};
use isovault::sync::SyncEngine;

#[derive(Debug, Clone)]
pub struct LoggedAction {
    pub user_id: Option<i64>,
    pub action: String,
    pub document_id: Option<i64>,
    pub details: Value,
}

/// In-memory stand-in for the Diesel repository.
#[derive(Default)]
pub struct FakeRepository {
    pub clients: Mutex<Vec<Client>>,
    pub users: Mutex<Vec<User>>,
    pub documents: Mutex<Vec<Document>>,
    pub logs: Mutex<Vec<LoggedAction>>,
    next_document_id: AtomicI64,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self {
            next_document_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn add_client(&self, client: Client) {
        self.clients.lock().unwrap().push(client);
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    pub fn logs_with_action(&self, action: &str) -> Vec<LoggedAction> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.action == action)
            .cloned()
            .collect()
    }

    pub fn client(&self, client_id: i64) -> Option<Client> {
        self.clients
            .lock()
            .unwrap()
            .iter()
            .find(|client| client.id == client_id)
            .cloned()
    }
}

#[async_trait]
impl DocumentRepository for FakeRepository {
    async fn client_by_id(&self, client_id: i64) -> Result<Option<Client>> {
        Ok(self.client(client_id))
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        Ok(self.clients.lock().unwrap().clone())
    }

    async fn admin_user_for_client(&self, client_id: i64) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.client_id == Some(client_id) && user.role == ROLE_ADMIN)
            .cloned())
    }

    async fn update_client_credentials(
        &self,
        client_id: i64,
        credentials: &DriveCredentials,
    ) -> Result<()> {
        let mut clients = self.clients.lock().unwrap();
        let client = clients
            .iter_mut()
            .find(|client| client.id == client_id)
            .ok_or_else(|| anyhow!("client {client_id} not found"))?;
        client.access_token = Some(credentials.access_token.clone());
        client.refresh_token = credentials.refresh_token.clone();
        client.token_expiry = credentials.token_expiry;
        Ok(())
    }

    async fn find_documents_by_path_and_title(
        &self,
        client_id: Option<i64>,
        hierarchical_path: &str,
        title: &str,
    ) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|doc| {
                doc.client_id == client_id
                    && doc.hierarchical_path == hierarchical_path
                    && doc.title == title
            })
            .cloned()
            .collect())
    }

    async fn find_document_by_path_title_revision(
        &self,
        client_id: Option<i64>,
        hierarchical_path: &str,
        title: &str,
        revision: i32,
    ) -> Result<Option<Document>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .find(|doc| {
                doc.client_id == client_id
                    && doc.hierarchical_path == hierarchical_path
                    && doc.title == title
                    && doc.revision == revision
            })
            .cloned())
    }

    async fn create_document(&self, draft: DocumentDraft) -> Result<Document> {
        let id = self.next_document_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now().naive_utc();
        let document = Document {
            id,
            title: draft.title,
            hierarchical_path: draft.hierarchical_path,
            revision: draft.revision,
            source_url: draft.source_url,
            file_type: draft.file_type,
            alert_status: draft.alert_status.map(|status| status.as_str().to_string()),
            alert_forced: draft.alert_forced,
            expiry_date: draft.expiry_date,
            is_obsolete: false,
            parent_id: None,
            integrity_hash: draft.integrity_hash,
            encrypted_cache_path: draft.encrypted_cache_path,
            client_id: draft.client_id,
            owner_id: draft.owner_id,
            created_at: now,
            updated_at: now,
        };
        self.documents.lock().unwrap().push(document.clone());
        Ok(document)
    }

    async fn mark_obsolete(&self, document_id: i64) -> Result<()> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .iter_mut()
            .find(|doc| doc.id == document_id)
            .ok_or_else(|| anyhow!("document {document_id} not found"))?;
        document.is_obsolete = true;
        Ok(())
    }

    async fn set_alert_status(
        &self,
        document_id: i64,
        status: isovault::sync::alerts::AlertStatus,
    ) -> Result<()> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .iter_mut()
            .find(|doc| doc.id == document_id)
            .ok_or_else(|| anyhow!("document {document_id} not found"))?;
        document.alert_status = Some(status.as_str().to_string());
        Ok(())
    }

    async fn documents_with_expiry(&self, client_id: i64) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|doc| {
                doc.client_id == Some(client_id)
                    && !doc.is_obsolete
                    && doc.expiry_date.is_some()
            })
            .cloned()
            .collect())
    }

    async fn append_log(
        &self,
        user_id: Option<i64>,
        action: &str,
        document_id: Option<i64>,
        details: Value,
    ) -> Result<()> {
        self.logs.lock().unwrap().push(LoggedAction {
            user_id,
            action: action.to_string(),
            document_id,
            details,
        });
        Ok(())
    }
}

/// In-memory folder tree: folder id -> direct children, with file contents
/// keyed by file id. Download failures can be injected per file name.
#[derive(Default)]
pub struct FakeStore {
    pub folders: Mutex<HashMap<String, Vec<RemoteFile>>>,
    pub contents: Mutex<HashMap<String, Vec<u8>>>,
    pub failing_downloads: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, parent: &str, id: &str, name: &str) {
        self.folders
            .lock()
            .unwrap()
            .entry(parent.to_string())
            .or_default()
            .push(RemoteFile {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: FOLDER_MIME.to_string(),
                view_url: None,
            });
    }

    pub fn add_file(&self, parent: &str, id: &str, name: &str, body: &[u8]) {
        self.folders
            .lock()
            .unwrap()
            .entry(parent.to_string())
            .or_default()
            .push(RemoteFile {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: "application/octet-stream".to_string(),
                view_url: Some(format!("https://example.test/view/{id}")),
            });
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), body.to_vec());
    }

    pub fn fail_download_of(&self, name: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .push(name.to_string());
    }
}

#[async_trait]
impl RemoteFileStore for FakeStore {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        Ok(self
            .folders
            .lock()
            .unwrap()
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<()> {
        if self
            .failing_downloads
            .lock()
            .unwrap()
            .iter()
            .any(|name| name == &file.name)
        {
            return Err(anyhow!("simulated download failure for {}", file.name));
        }
        let body = self
            .contents
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or_else(|| anyhow!("no content for file {}", file.id))?;
        tokio::fs::write(dest, body).await?;
        Ok(())
    }
}

/// Hands out the wrapped store; optionally reports a refreshed access token
/// the way the real connector does after an OAuth refresh.
pub struct FakeConnector {
    pub store: Arc<FakeStore>,
    pub refreshed_token: Option<String>,
}

impl FakeConnector {
    pub fn new(store: Arc<FakeStore>) -> Self {
        Self {
            store,
            refreshed_token: None,
        }
    }

    pub fn refreshing_to(store: Arc<FakeStore>, token: &str) -> Self {
        Self {
            store,
            refreshed_token: Some(token.to_string()),
        }
    }
}

#[async_trait]
impl DriveConnector for FakeConnector {
    async fn connect(
        &self,
        credentials: DriveCredentials,
    ) -> Result<(Arc<dyn RemoteFileStore>, DriveCredentials)> {
        let credentials = match &self.refreshed_token {
            Some(token) => DriveCredentials {
                access_token: token.clone(),
                refresh_token: credentials.refresh_token,
                token_expiry: Some((Utc::now() + chrono::Duration::hours(1)).naive_utc()),
            },
            None => credentials,
        };
        Ok((self.store.clone() as Arc<dyn RemoteFileStore>, credentials))
    }
}

/// One fully wired engine over fakes. The cache directory lives as long as
/// the harness.
pub struct TestHarness {
    pub repo: Arc<FakeRepository>,
    pub store: Arc<FakeStore>,
    pub engine: Arc<SyncEngine>,
    _cache_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(FakeStore::new());
        let connector = Arc::new(FakeConnector::new(store.clone()));
        Self::with_connector(store, connector)
    }

    pub fn with_connector(store: Arc<FakeStore>, connector: Arc<FakeConnector>) -> Self {
        let repo = Arc::new(FakeRepository::new());
        let cache_dir = TempDir::new().expect("failed to create cache dir");
        let vault =
            Arc::new(FileVault::new("test-vault-secret", cache_dir.path()).expect("vault init"));
        let engine = Arc::new(SyncEngine::new(
            repo.clone(),
            connector,
            vault,
            None,
        ));
        Self {
            repo,
            store,
            engine,
            _cache_dir: cache_dir,
        }
    }

    /// A tenant with stored credentials plus its admin user.
    pub fn seed_tenant(&self, client_id: i64, folder: &str) {
        self.repo.add_client(make_client(client_id, Some(folder)));
        self.repo.add_user(make_admin(client_id * 100, client_id));
    }
}

pub fn make_client(id: i64, folder: Option<&str>) -> Client {
    let now = Utc::now().naive_utc();
    Client {
        id,
        name: format!("Client {id}"),
        drive_folder_id: folder.map(str::to_string),
        access_token: Some("stored-access-token".to_string()),
        refresh_token: Some("stored-refresh-token".to_string()),
        token_expiry: None,
        warning_days: 30,
        created_at: now,
        updated_at: now,
    }
}

pub fn make_admin(id: i64, client_id: i64) -> User {
    let now = Utc::now().naive_utc();
    User {
        id,
        email: format!("admin{id}@example.test"),
        password_hash: "unused".to_string(),
        role: ROLE_ADMIN.to_string(),
        client_id: Some(client_id),
        last_login: None,
        session_expiry: None,
        created_at: now,
    }
}

pub fn document_by_revision(documents: &[Document], revision: i32) -> Option<&Document> {
    documents.iter().find(|doc| doc.revision == revision)
}

pub fn expiring_filename(title: &str, revision: u32, date: NaiveDate) -> String {
    format!("8.2.1_{title}_Rev.{revision}_{date}.pdf")
}
