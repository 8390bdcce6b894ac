use axum::extract::{Json, Query, State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::LogEntry;
use crate::schema::logs;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Deserialize)]
pub struct LogListQuery {
    pub limit: Option<i64>,
    pub action: Option<String>,
    pub document_id: Option<i64>,
}

#[derive(Serialize)]
pub struct LogResponse {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub document_id: Option<i64>,
    pub details: serde_json::Value,
    pub logged_at: String,
}

impl From<LogEntry> for LogResponse {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            action: entry.action,
            document_id: entry.document_id,
            details: entry.details,
            logged_at: entry.logged_at.and_utc().to_rfc3339(),
        }
    }
}

pub async fn list_logs(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<LogListQuery>,
) -> AppResult<Json<Vec<LogResponse>>> {
    auth.require_admin()?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let mut conn = state.db()?;
    let mut query = logs::table.into_boxed();
    if let Some(action) = params.action.as_deref() {
        query = query.filter(logs::action.eq(action.to_string()));
    }
    if let Some(document_id) = params.document_id {
        query = query.filter(logs::document_id.eq(Some(document_id)));
    }

    let rows: Vec<LogEntry> = query
        .order(logs::logged_at.desc())
        .limit(limit)
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(LogResponse::from).collect()))
}
