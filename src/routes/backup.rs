use axum::extract::{Json, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{Client, CompanyCode, Document, LogEntry, User};
use crate::schema::{clients, company_codes, counters, documents, logs, users};
use crate::sequence::{
    ENTITY_CLIENT, ENTITY_COMPANY_CODE, ENTITY_DOCUMENT, ENTITY_LOG, ENTITY_USER,
};
use crate::state::AppState;

/// Full-database dump. Rows are serialized verbatim, including password
/// hashes and stored OAuth tokens, so a restore reproduces the exact state.
#[derive(Serialize, Deserialize)]
pub struct BackupDump {
    pub clients: Vec<Client>,
    pub users: Vec<User>,
    pub documents: Vec<Document>,
    pub company_codes: Vec<CompanyCode>,
    pub logs: Vec<LogEntry>,
}

pub async fn export_backup(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<BackupDump>> {
    auth.require_admin()?;
    let mut conn = state.db()?;

    let dump = BackupDump {
        clients: clients::table.order(clients::id.asc()).load(&mut conn)?,
        users: users::table.order(users::id.asc()).load(&mut conn)?,
        documents: documents::table.order(documents::id.asc()).load(&mut conn)?,
        company_codes: company_codes::table
            .order(company_codes::id.asc())
            .load(&mut conn)?,
        logs: logs::table.order(logs::id.asc()).load(&mut conn)?,
    };

    super::auth::append_log(&mut conn, Some(auth.user_id), "backup_exported", json!({}))?;
    info!(
        clients = dump.clients.len(),
        documents = dump.documents.len(),
        "backup exported"
    );

    Ok(Json(dump))
}

/// Replaces every table with the dump's contents. Tables are cleared in
/// foreign-key order, re-inserted in reverse, and the id counters reseeded
/// from the restored rows, all inside one transaction.
pub async fn restore_backup(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(dump): Json<BackupDump>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    let mut conn = state.db()?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(logs::table).execute(conn)?;
        diesel::delete(company_codes::table).execute(conn)?;
        diesel::delete(documents::table).execute(conn)?;
        diesel::delete(users::table).execute(conn)?;
        diesel::delete(clients::table).execute(conn)?;
        diesel::delete(counters::table).execute(conn)?;

        diesel::insert_into(clients::table)
            .values(&dump.clients)
            .execute(conn)?;
        diesel::insert_into(users::table)
            .values(&dump.users)
            .execute(conn)?;
        diesel::insert_into(documents::table)
            .values(&dump.documents)
            .execute(conn)?;
        diesel::insert_into(company_codes::table)
            .values(&dump.company_codes)
            .execute(conn)?;
        diesel::insert_into(logs::table)
            .values(&dump.logs)
            .execute(conn)?;

        let seeds = [
            (ENTITY_CLIENT, max_id(dump.clients.iter().map(|row| row.id))),
            (ENTITY_USER, max_id(dump.users.iter().map(|row| row.id))),
            (
                ENTITY_DOCUMENT,
                max_id(dump.documents.iter().map(|row| row.id)),
            ),
            (
                ENTITY_COMPANY_CODE,
                max_id(dump.company_codes.iter().map(|row| row.id)),
            ),
            (ENTITY_LOG, max_id(dump.logs.iter().map(|row| row.id))),
        ];
        for (entity, value) in seeds {
            diesel::insert_into(counters::table)
                .values((counters::entity.eq(entity), counters::value.eq(value)))
                .execute(conn)?;
        }

        Ok(())
    })?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "backup_restored",
        json!({
            "clients": dump.clients.len(),
            "users": dump.users.len(),
            "documents": dump.documents.len(),
        }),
    )?;
    info!("backup restored");

    Ok(StatusCode::NO_CONTENT)
}

fn max_id(ids: impl Iterator<Item = i64>) -> i64 {
    ids.max().unwrap_or(0)
}
