use std::path::PathBuf;

use axum::extract::{Json, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task;
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::Document;
use crate::repo::{DieselRepository, DocumentDraft, DocumentRepository};
use crate::schema::documents;
use crate::sharelink::ShareLinkError;
use crate::state::AppState;
use crate::sync::alerts::AlertStatus;
use crate::sync::obsolete;

const DEFAULT_SHARE_TTL_MS: i64 = 60 * 60 * 1000;
const SHARE_ACTION_DOWNLOAD: &str = "download";

#[derive(Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub include_obsolete: bool,
    pub client_id: Option<i64>,
    pub path: Option<String>,
    pub query: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: i64,
    pub title: String,
    pub hierarchical_path: String,
    pub revision: i32,
    pub revision_label: String,
    pub source_url: String,
    pub file_type: String,
    pub alert_status: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub is_obsolete: bool,
    pub client_id: Option<i64>,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            revision_label: document.revision_label(),
            title: document.title,
            hierarchical_path: document.hierarchical_path,
            revision: document.revision,
            source_url: document.source_url,
            file_type: document.file_type,
            alert_status: document.alert_status,
            expiry_date: document.expiry_date,
            is_obsolete: document.is_obsolete,
            client_id: document.client_id,
            owner_id: document.owner_id,
            created_at: document.created_at.and_utc().to_rfc3339(),
            updated_at: document.updated_at.and_utc().to_rfc3339(),
        }
    }
}

/// Tenant scope of a request: admins may address any tenant, viewers only
/// their own.
fn effective_client_id(auth: &AuthenticatedUser, requested: Option<i64>) -> AppResult<Option<i64>> {
    if auth.is_admin() {
        Ok(requested.or(auth.client_id))
    } else {
        match requested {
            Some(id) if Some(id) != auth.client_id => Err(AppError::forbidden()),
            _ => Ok(auth.client_id),
        }
    }
}

fn authorize_document(auth: &AuthenticatedUser, document: &Document) -> AppResult<()> {
    if auth.is_admin() || document.client_id == auth.client_id {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<DocumentListQuery>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let client_id = effective_client_id(&auth, params.client_id)?;
    let mut conn = state.db()?;

    let mut query = documents::table.into_boxed();
    if let Some(id) = client_id {
        query = query.filter(documents::client_id.eq(Some(id)));
    } else if !auth.is_admin() {
        query = query.filter(documents::client_id.is_null());
    }
    if !params.include_obsolete {
        query = query.filter(documents::is_obsolete.eq(false));
    }
    if let Some(path) = params.path.as_deref() {
        query = query.filter(documents::hierarchical_path.like(format!("{path}%")));
    }
    if let Some(needle) = params.query.as_deref() {
        query = query.filter(documents::title.ilike(format!("%{needle}%")));
    }

    let rows: Vec<Document> = query
        .order((documents::hierarchical_path.asc(), documents::revision.desc()))
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(DocumentResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub hierarchical_path: String,
    pub revision: i32,
    pub source_url: String,
    pub file_type: String,
    pub expiry_date: Option<NaiveDate>,
    pub client_id: Option<i64>,
}

pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateDocumentRequest>,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    auth.require_admin()?;
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    if payload.revision < 0 {
        return Err(AppError::bad_request("revision must not be negative"));
    }

    let client_id = effective_client_id(&auth, payload.client_id)?;

    let repo = DieselRepository::new(state.pool.clone());
    let existing = repo
        .find_document_by_path_title_revision(
            client_id,
            &payload.hierarchical_path,
            &payload.title,
            payload.revision,
        )
        .await?;
    if existing.is_some() {
        return Err(AppError::bad_request("this revision already exists"));
    }

    let draft = DocumentDraft {
        title: payload.title.trim().to_string(),
        hierarchical_path: payload.hierarchical_path.clone(),
        revision: payload.revision,
        source_url: payload.source_url,
        file_type: payload.file_type.to_lowercase(),
        alert_status: Some(AlertStatus::None),
        alert_forced: false,
        expiry_date: payload.expiry_date,
        integrity_hash: None,
        encrypted_cache_path: None,
        client_id,
        owner_id: auth.user_id,
    };

    let document = repo.create_document(draft).await?;
    repo.append_log(
        Some(auth.user_id),
        "document_created",
        Some(document.id),
        json!({"title": document.title, "revision": document.revision}),
    )
    .await?;
    obsolete::resolve_obsolete(&repo, &document, auth.user_id).await;

    info!(document_id = document.id, "document created manually");
    Ok((StatusCode::CREATED, Json(document.into())))
}

pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document: Document = documents::table.find(id).first(&mut conn)?;
    authorize_document(&auth, &document)?;
    Ok(Json(document.into()))
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

pub async fn update_document(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<DocumentResponse>> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let document: Document = documents::table.find(id).first(&mut conn)?;
    authorize_document(&auth, &document)?;

    if let Some(title) = payload.title.as_deref() {
        if title.trim().is_empty() {
            return Err(AppError::bad_request("title must not be empty"));
        }
        diesel::update(documents::table.find(id))
            .set(documents::title.eq(title.trim()))
            .execute(&mut conn)?;
    }
    if let Some(source_url) = payload.source_url.as_deref() {
        diesel::update(documents::table.find(id))
            .set(documents::source_url.eq(source_url))
            .execute(&mut conn)?;
    }
    if let Some(expiry_date) = payload.expiry_date {
        diesel::update(documents::table.find(id))
            .set(documents::expiry_date.eq(Some(expiry_date)))
            .execute(&mut conn)?;
    }
    diesel::update(documents::table.find(id))
        .set(documents::updated_at.eq(chrono::Utc::now().naive_utc()))
        .execute(&mut conn)?;

    let document: Document = documents::table.find(id).first(&mut conn)?;
    Ok(Json(document.into()))
}

/// Deleting never removes the row; the document is flipped to obsolete so
/// the audit trail stays intact.
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let document: Document = documents::table.find(id).first(&mut conn)?;
    authorize_document(&auth, &document)?;

    diesel::update(documents::table.find(id))
        .set((
            documents::is_obsolete.eq(true),
            documents::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "document_deleted",
        json!({"document_id": id, "title": document.title}),
    )?;
    info!(document_id = id, "document marked obsolete by request");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_document(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    let document: Document = documents::table.find(id).first(&mut conn)?;
    authorize_document(&auth, &document)?;
    drop(conn);

    serve_cached_file(&state, &document).await
}

#[derive(Deserialize)]
pub struct ShareRequest {
    pub ttl_ms: Option<i64>,
}

#[derive(Serialize)]
pub struct ShareResponse {
    pub url: String,
    pub expires: i64,
}

pub async fn share_document(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<ShareRequest>,
) -> AppResult<Json<ShareResponse>> {
    let mut conn = state.db()?;
    let document: Document = documents::table.find(id).first(&mut conn)?;
    authorize_document(&auth, &document)?;

    let ttl_ms = payload.ttl_ms.unwrap_or(DEFAULT_SHARE_TTL_MS);
    if ttl_ms <= 0 {
        return Err(AppError::bad_request("ttl_ms must be positive"));
    }

    let token = state
        .share_links
        .generate(Some(document.id), auth.user_id, SHARE_ACTION_DOWNLOAD, ttl_ms)
        .map_err(AppError::internal)?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "document_shared",
        json!({"document_id": document.id, "expires": token.expires}),
    )?;

    Ok(Json(ShareResponse {
        url: format!("/share/{}/{}/{}", token.payload, token.expires, token.signature),
        expires: token.expires,
    }))
}

pub async fn download_shared(
    State(state): State<AppState>,
    Path((payload, expires, signature)): Path<(String, i64, String)>,
) -> AppResult<impl IntoResponse> {
    let share = state
        .share_links
        .validate(&payload, expires, &signature)
        .map_err(|err| match err {
            ShareLinkError::Expired => AppError::new(StatusCode::GONE, "share link expired"),
            _ => AppError::unauthorized(),
        })?;

    if share.action != SHARE_ACTION_DOWNLOAD {
        return Err(AppError::forbidden());
    }
    let document_id = share.document_id.ok_or_else(AppError::not_found)?;

    let mut conn = state.db()?;
    let document: Document = documents::table.find(document_id).first(&mut conn)?;
    drop(conn);

    serve_cached_file(&state, &document).await
}

async fn serve_cached_file(
    state: &AppState,
    document: &Document,
) -> AppResult<(HeaderMap, Vec<u8>)> {
    let cache_path = document
        .encrypted_cache_path
        .as_deref()
        .ok_or_else(|| AppError::not_found())?;

    let vault = state.vault.clone();
    let path = PathBuf::from(cache_path);
    let plaintext = task::spawn_blocking(move || vault.load(&path))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)?;

    let filename = format!(
        "{}_{}_{}.{}",
        document.hierarchical_path,
        document.title.replace(' ', "_"),
        document.revision_label(),
        document.file_type
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&document.file_type)),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, plaintext))
}

fn content_type_for(file_type: &str) -> &'static str {
    match file_type {
        "pdf" => "application/pdf",
        "xlsx" | "xls" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" | "doc" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "csv" => "text/csv",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::content_type_for;

    #[test]
    fn known_extensions_map_to_specific_types() {
        assert_eq!(content_type_for("pdf"), "application/pdf");
        assert_eq!(content_type_for("csv"), "text/csv");
    }

    #[test]
    fn unknown_extensions_fall_back_to_octet_stream() {
        assert_eq!(content_type_for("zip"), "application/octet-stream");
    }
}
