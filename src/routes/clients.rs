use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::drive::extract_folder_id;
use crate::error::{AppError, AppResult};
use crate::models::{Client, NewClient};
use crate::schema::clients;
use crate::sequence::{self, ENTITY_CLIENT};
use crate::state::AppState;

/// Stored OAuth tokens never leave the server; the response only says
/// whether credentials are present.
#[derive(Serialize)]
pub struct ClientResponse {
    pub id: i64,
    pub name: String,
    pub drive_folder_id: Option<String>,
    pub has_credentials: bool,
    pub warning_days: i32,
    pub sync_running: bool,
}

pub async fn list_clients(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<ClientResponse>>> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let rows: Vec<Client> = clients::table.order(clients::id.asc()).load(&mut conn)?;
    drop(conn);

    let mut responses = Vec::with_capacity(rows.len());
    for client in rows {
        let sync_running = state.scheduler.is_running(client.id).await;
        responses.push(to_response(client, sync_running));
    }
    Ok(Json(responses))
}

#[derive(Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub drive_folder: Option<String>,
}

pub async fn create_client(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateClientRequest>,
) -> AppResult<(StatusCode, Json<ClientResponse>)> {
    auth.require_admin()?;
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("client name must not be empty"));
    }
    let drive_folder_id = normalize_folder(payload.drive_folder.as_deref())?;

    let mut conn = state.db()?;
    let client = conn.transaction::<Client, diesel::result::Error, _>(|conn| {
        let id = sequence::next_id(conn, ENTITY_CLIENT)?;
        let new_client = NewClient {
            id,
            name: payload.name.trim().to_string(),
            drive_folder_id,
        };
        diesel::insert_into(clients::table)
            .values(&new_client)
            .execute(conn)?;
        clients::table.find(id).first(conn)
    })?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "client_created",
        json!({"client_id": client.id, "name": client.name}),
    )?;
    info!(client_id = client.id, "client created");

    Ok((StatusCode::CREATED, Json(to_response(client, false))))
}

#[derive(Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub drive_folder: Option<String>,
}

pub async fn update_client(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateClientRequest>,
) -> AppResult<Json<ClientResponse>> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let _existing: Client = clients::table.find(id).first(&mut conn)?;

    if let Some(name) = payload.name.as_deref() {
        if name.trim().is_empty() {
            return Err(AppError::bad_request("client name must not be empty"));
        }
        diesel::update(clients::table.find(id))
            .set(clients::name.eq(name.trim()))
            .execute(&mut conn)?;
    }
    if let Some(folder) = payload.drive_folder.as_deref() {
        let normalized = normalize_folder(Some(folder))?;
        diesel::update(clients::table.find(id))
            .set(clients::drive_folder_id.eq(normalized))
            .execute(&mut conn)?;
    }
    diesel::update(clients::table.find(id))
        .set(clients::updated_at.eq(Utc::now().naive_utc()))
        .execute(&mut conn)?;

    let client: Client = clients::table.find(id).first(&mut conn)?;
    drop(conn);
    let sync_running = state.scheduler.is_running(client.id).await;
    Ok(Json(to_response(client, sync_running)))
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<NaiveDateTime>,
}

pub async fn set_credentials(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<CredentialsRequest>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    if payload.access_token.trim().is_empty() {
        return Err(AppError::bad_request("access_token must not be empty"));
    }

    let mut conn = state.db()?;
    let _existing: Client = clients::table.find(id).first(&mut conn)?;

    diesel::update(clients::table.find(id))
        .set((
            clients::access_token.eq(Some(payload.access_token)),
            clients::refresh_token.eq(payload.refresh_token),
            clients::token_expiry.eq(payload.token_expiry),
            clients::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "client_credentials_updated",
        json!({"client_id": id}),
    )?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct WarningDaysRequest {
    pub warning_days: i32,
}

pub async fn set_warning_days(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<WarningDaysRequest>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    if payload.warning_days < 0 {
        return Err(AppError::bad_request("warning_days must not be negative"));
    }

    let mut conn = state.db()?;
    let _existing: Client = clients::table.find(id).first(&mut conn)?;

    diesel::update(clients::table.find(id))
        .set((
            clients::warning_days.eq(payload.warning_days),
            clients::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Kicks off one sync pass in the background and returns immediately. The
/// per-tenant pass lock serializes it against any timer-driven pass.
pub async fn trigger_sync(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let client: Client = clients::table.find(id).first(&mut conn)?;
    drop(conn);

    if client.drive_folder_id.is_none() {
        return Err(AppError::bad_request("client has no drive folder configured"));
    }

    let engine = state.scheduler.engine().clone();
    tokio::spawn(async move {
        engine.run_for_client(id).await;
    });

    info!(client_id = id, "manual sync pass requested");
    Ok(StatusCode::ACCEPTED)
}

pub async fn start_sync_timer(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let client: Client = clients::table.find(id).first(&mut conn)?;
    drop(conn);

    if client.drive_folder_id.is_none() {
        return Err(AppError::bad_request("client has no drive folder configured"));
    }

    state.scheduler.start(id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_sync_timer(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    state.scheduler.stop(id).await;
    Ok(StatusCode::NO_CONTENT)
}

fn to_response(client: Client, sync_running: bool) -> ClientResponse {
    ClientResponse {
        id: client.id,
        name: client.name,
        drive_folder_id: client.drive_folder_id,
        has_credentials: client.access_token.is_some(),
        warning_days: client.warning_days,
        sync_running,
    }
}

fn normalize_folder(raw: Option<&str>) -> AppResult<Option<String>> {
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => extract_folder_id(value)
            .map(Some)
            .ok_or_else(|| AppError::bad_request("unrecognized drive folder id or URL")),
    }
}
