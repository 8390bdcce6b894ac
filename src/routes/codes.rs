use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{CompanyCode, NewCompanyCode, ROLE_ADMIN, ROLE_VIEWER};
use crate::schema::company_codes;
use crate::sequence::{self, ENTITY_COMPANY_CODE};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CodeResponse {
    pub id: i64,
    pub code: String,
    pub role: String,
    pub usage_limit: i32,
    pub usage_count: i32,
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
}

impl From<CompanyCode> for CodeResponse {
    fn from(code: CompanyCode) -> Self {
        Self {
            id: code.id,
            code: code.code,
            role: code.role,
            usage_limit: code.usage_limit,
            usage_count: code.usage_count,
            expires_at: code.expires_at,
            is_active: code.is_active,
        }
    }
}

pub async fn list_codes(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<CodeResponse>>> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let rows: Vec<CompanyCode> = company_codes::table
        .order(company_codes::id.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(CodeResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateCodeRequest {
    pub code: String,
    pub role: Option<String>,
    pub usage_limit: Option<i32>,
    pub expires_at: Option<NaiveDateTime>,
}

pub async fn create_code(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateCodeRequest>,
) -> AppResult<(StatusCode, Json<CodeResponse>)> {
    auth.require_admin()?;
    if payload.code.trim().is_empty() {
        return Err(AppError::bad_request("code must not be empty"));
    }
    let role = payload.role.unwrap_or_else(|| ROLE_VIEWER.to_string());
    if role != ROLE_ADMIN && role != ROLE_VIEWER {
        return Err(AppError::bad_request("role must be 'admin' or 'viewer'"));
    }
    let usage_limit = payload.usage_limit.unwrap_or(1);
    if usage_limit < 1 {
        return Err(AppError::bad_request("usage_limit must be at least 1"));
    }

    let mut conn = state.db()?;
    let code = conn.transaction::<CompanyCode, diesel::result::Error, _>(|conn| {
        let id = sequence::next_id(conn, ENTITY_COMPANY_CODE)?;
        let new_code = NewCompanyCode {
            id,
            code: payload.code.trim().to_string(),
            role: role.clone(),
            usage_limit,
            expires_at: payload.expires_at,
            created_by: Some(auth.user_id),
        };
        diesel::insert_into(company_codes::table)
            .values(&new_code)
            .execute(conn)?;
        company_codes::table.find(id).first(conn)
    })?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "company_code_created",
        json!({"code_id": code.id, "role": code.role}),
    )?;

    Ok((StatusCode::CREATED, Json(code.into())))
}

#[derive(Deserialize)]
pub struct UpdateCodeRequest {
    pub is_active: Option<bool>,
    pub usage_limit: Option<i32>,
    pub expires_at: Option<NaiveDateTime>,
}

pub async fn update_code(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCodeRequest>,
) -> AppResult<Json<CodeResponse>> {
    auth.require_admin()?;
    let mut conn = state.db()?;
    let _existing: CompanyCode = company_codes::table.find(id).first(&mut conn)?;

    if let Some(is_active) = payload.is_active {
        diesel::update(company_codes::table.find(id))
            .set(company_codes::is_active.eq(is_active))
            .execute(&mut conn)?;
    }
    if let Some(usage_limit) = payload.usage_limit {
        if usage_limit < 1 {
            return Err(AppError::bad_request("usage_limit must be at least 1"));
        }
        diesel::update(company_codes::table.find(id))
            .set(company_codes::usage_limit.eq(usage_limit))
            .execute(&mut conn)?;
    }
    if let Some(expires_at) = payload.expires_at {
        diesel::update(company_codes::table.find(id))
            .set(company_codes::expires_at.eq(Some(expires_at)))
            .execute(&mut conn)?;
    }

    let code: CompanyCode = company_codes::table.find(id).first(&mut conn)?;
    Ok(Json(code.into()))
}
