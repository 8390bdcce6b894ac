use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{CompanyCode, NewLogEntry, NewUser, User},
    schema::{company_codes, logs, users},
    sequence::{self, ENTITY_LOG, ENTITY_USER},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub client_id: Option<i64>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            client_id: user.client_id,
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::email.eq(&payload.email))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let now = Utc::now();
    let session_expiry = now + ChronoDuration::hours(state.config.session_expiry_hours);
    diesel::update(users::table.find(user.id))
        .set((
            users::last_login.eq(Some(now.naive_utc())),
            users::session_expiry.eq(Some(session_expiry.naive_utc())),
        ))
        .execute(&mut conn)?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, &user.role, user.client_id, session_expiry)
        .map_err(AppError::from)?;

    append_log(&mut conn, Some(user.id), "user_login", json!({"email": user.email}))?;
    info!(user_id = user.id, "user logged in");

    let expires_in = (state.config.jwt_expiry_minutes * 60)
        .min((session_expiry - now).num_seconds());

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in,
        user: user.into(),
    }))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub company_code: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    if payload.password.len() < 8 {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }

    let password_hash =
        password::hash_password(&payload.password).map_err(AppError::internal)?;

    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    let user = conn.transaction::<User, AppError, _>(|conn| {
        let code: CompanyCode = company_codes::table
            .filter(company_codes::code.eq(&payload.company_code))
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::bad_request("invalid company code"))?;

        if !code.is_valid(now) {
            return Err(AppError::bad_request("company code is exhausted or expired"));
        }

        let already_taken = diesel::dsl::select(diesel::dsl::exists(
            users::table.filter(users::email.eq(&payload.email)),
        ))
        .get_result::<bool>(conn)?;
        if already_taken {
            return Err(AppError::bad_request("email is already registered"));
        }

        diesel::update(company_codes::table.find(code.id))
            .set(company_codes::usage_count.eq(company_codes::usage_count + 1))
            .execute(conn)?;

        // The account joins the tenant of the admin who issued the code;
        // viewers cannot exist without one.
        let inherited = match code.created_by {
            Some(creator_id) => users::table
                .find(creator_id)
                .select(users::client_id)
                .first::<Option<i64>>(conn)
                .optional()?
                .flatten(),
            None => None,
        };
        let client_id = super::users::resolve_tenant(&code.role, None, inherited)?;

        let id = sequence::next_id(conn, ENTITY_USER)?;
        let new_user = NewUser {
            id,
            email: payload.email.clone(),
            password_hash,
            role: code.role.clone(),
            client_id,
        };
        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(conn)?;

        Ok(users::table.find(id).first(conn)?)
    })?;

    append_log(
        &mut conn,
        Some(user.id),
        "user_registered",
        json!({"email": user.email, "role": user.role}),
    )?;
    info!(user_id = user.id, "user registered");

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let user: User = users::table.find(auth.user_id).first(&mut conn)?;
    Ok(Json(user.into()))
}

pub(super) fn append_log(
    conn: &mut PgConnection,
    user_id: Option<i64>,
    action: &str,
    details: serde_json::Value,
) -> AppResult<()> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let id = sequence::next_id(conn, ENTITY_LOG)?;
        let entry = NewLogEntry {
            id,
            user_id,
            action: action.to_string(),
            document_id: None,
            details,
        };
        diesel::insert_into(logs::table).values(&entry).execute(conn)
    })?;
    Ok(())
}
