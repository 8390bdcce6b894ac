use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::db::PgPool;
use crate::drive::DriveCredentials;
use crate::models::{Client, Document, NewDocument, NewLogEntry, User, ROLE_ADMIN};
use crate::schema::{clients, documents, logs, users};
use crate::sequence::{self, ENTITY_DOCUMENT, ENTITY_LOG};
use crate::sync::alerts::AlertStatus;

/// A document as the sync pipeline wants to persist it; the repository
/// assigns the identifier.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub title: String,
    pub hierarchical_path: String,
    pub revision: i32,
    pub source_url: String,
    pub file_type: String,
    pub alert_status: Option<AlertStatus>,
    pub alert_forced: bool,
    pub expiry_date: Option<NaiveDate>,
    pub integrity_hash: Option<String>,
    pub encrypted_cache_path: Option<String>,
    pub client_id: Option<i64>,
    pub owner_id: i64,
}

/// Storage seam consumed by the ingestion pipeline. The production
/// implementation is backed by Diesel; tests provide an in-memory fake.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn client_by_id(&self, client_id: i64) -> Result<Option<Client>>;

    async fn list_clients(&self) -> Result<Vec<Client>>;

    async fn admin_user_for_client(&self, client_id: i64) -> Result<Option<User>>;

    async fn update_client_credentials(
        &self,
        client_id: i64,
        credentials: &DriveCredentials,
    ) -> Result<()>;

    async fn find_documents_by_path_and_title(
        &self,
        client_id: Option<i64>,
        hierarchical_path: &str,
        title: &str,
    ) -> Result<Vec<Document>>;

    async fn find_document_by_path_title_revision(
        &self,
        client_id: Option<i64>,
        hierarchical_path: &str,
        title: &str,
        revision: i32,
    ) -> Result<Option<Document>>;

    async fn create_document(&self, draft: DocumentDraft) -> Result<Document>;

    async fn mark_obsolete(&self, document_id: i64) -> Result<()>;

    async fn set_alert_status(&self, document_id: i64, status: AlertStatus) -> Result<()>;

    /// Non-obsolete documents of the tenant that carry an expiry date.
    async fn documents_with_expiry(&self, client_id: i64) -> Result<Vec<Document>>;

    async fn append_log(
        &self,
        user_id: Option<i64>,
        action: &str,
        document_id: Option<i64>,
        details: Value,
    ) -> Result<()>;
}

pub struct DieselRepository {
    pool: PgPool,
}

impl DieselRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>> {
        self.pool.get().context("database pool exhausted")
    }
}

#[async_trait]
impl DocumentRepository for DieselRepository {
    async fn client_by_id(&self, client_id: i64) -> Result<Option<Client>> {
        let mut conn = self.conn()?;
        let client = clients::table
            .find(client_id)
            .first(&mut conn)
            .optional()
            .context("failed to load client")?;
        Ok(client)
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        let mut conn = self.conn()?;
        let rows = clients::table
            .order(clients::id.asc())
            .load(&mut conn)
            .context("failed to list clients")?;
        Ok(rows)
    }

    async fn admin_user_for_client(&self, client_id: i64) -> Result<Option<User>> {
        let mut conn = self.conn()?;
        let user = users::table
            .filter(users::client_id.eq(client_id))
            .filter(users::role.eq(ROLE_ADMIN))
            .order(users::id.asc())
            .first(&mut conn)
            .optional()
            .context("failed to load tenant admin")?;
        Ok(user)
    }

    async fn update_client_credentials(
        &self,
        client_id: i64,
        credentials: &DriveCredentials,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(clients::table.find(client_id))
            .set((
                clients::access_token.eq(Some(credentials.access_token.clone())),
                clients::refresh_token.eq(credentials.refresh_token.clone()),
                clients::token_expiry.eq(credentials.token_expiry),
                clients::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .context("failed to persist refreshed credentials")?;
        Ok(())
    }

    async fn find_documents_by_path_and_title(
        &self,
        client_id: Option<i64>,
        hierarchical_path: &str,
        title: &str,
    ) -> Result<Vec<Document>> {
        let mut conn = self.conn()?;
        let mut query = documents::table
            .filter(documents::hierarchical_path.eq(hierarchical_path))
            .filter(documents::title.eq(title))
            .into_boxed();
        query = match client_id {
            Some(id) => query.filter(documents::client_id.eq(Some(id))),
            None => query.filter(documents::client_id.is_null()),
        };
        let rows = query
            .load(&mut conn)
            .context("failed to load documents by path and title")?;
        Ok(rows)
    }

    async fn find_document_by_path_title_revision(
        &self,
        client_id: Option<i64>,
        hierarchical_path: &str,
        title: &str,
        revision: i32,
    ) -> Result<Option<Document>> {
        let mut conn = self.conn()?;
        let mut query = documents::table
            .filter(documents::hierarchical_path.eq(hierarchical_path))
            .filter(documents::title.eq(title))
            .filter(documents::revision.eq(revision))
            .into_boxed();
        query = match client_id {
            Some(id) => query.filter(documents::client_id.eq(Some(id))),
            None => query.filter(documents::client_id.is_null()),
        };
        let row = query
            .first(&mut conn)
            .optional()
            .context("failed to look up document revision")?;
        Ok(row)
    }

    async fn create_document(&self, draft: DocumentDraft) -> Result<Document> {
        let mut conn = self.conn()?;
        let document = conn
            .transaction::<Document, diesel::result::Error, _>(|conn| {
                let id = sequence::next_id(conn, ENTITY_DOCUMENT)?;
                let new_document = NewDocument {
                    id,
                    title: draft.title.clone(),
                    hierarchical_path: draft.hierarchical_path.clone(),
                    revision: draft.revision,
                    source_url: draft.source_url.clone(),
                    file_type: draft.file_type.clone(),
                    alert_status: draft.alert_status.map(|status| status.as_str().to_string()),
                    alert_forced: draft.alert_forced,
                    expiry_date: draft.expiry_date,
                    integrity_hash: draft.integrity_hash.clone(),
                    encrypted_cache_path: draft.encrypted_cache_path.clone(),
                    client_id: draft.client_id,
                    owner_id: draft.owner_id,
                };
                diesel::insert_into(documents::table)
                    .values(&new_document)
                    .execute(conn)?;
                documents::table.find(id).first(conn)
            })
            .context("failed to create document")?;
        Ok(document)
    }

    async fn mark_obsolete(&self, document_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(documents::table.find(document_id))
            .set((
                documents::is_obsolete.eq(true),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .context("failed to mark document obsolete")?;
        Ok(())
    }

    async fn set_alert_status(&self, document_id: i64, status: AlertStatus) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(documents::table.find(document_id))
            .set((
                documents::alert_status.eq(Some(status.as_str().to_string())),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .context("failed to update alert status")?;
        Ok(())
    }

    async fn documents_with_expiry(&self, client_id: i64) -> Result<Vec<Document>> {
        let mut conn = self.conn()?;
        let rows = documents::table
            .filter(documents::client_id.eq(Some(client_id)))
            .filter(documents::is_obsolete.eq(false))
            .filter(documents::expiry_date.is_not_null())
            .load(&mut conn)
            .context("failed to load documents with expiry dates")?;
        Ok(rows)
    }

    async fn append_log(
        &self,
        user_id: Option<i64>,
        action: &str,
        document_id: Option<i64>,
        details: Value,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let id = sequence::next_id(conn, ENTITY_LOG)?;
            let entry = NewLogEntry {
                id,
                user_id,
                action: action.to_string(),
                document_id,
                details,
            };
            diesel::insert_into(logs::table).values(&entry).execute(conn)
        })
        .context("failed to append audit log entry")?;
        Ok(())
    }
}
