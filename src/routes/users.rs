use axum::extract::{Json, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{password, AuthenticatedUser};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User, ROLE_ADMIN, ROLE_VIEWER};
use crate::schema::users;
use crate::sequence::{self, ENTITY_USER};
use crate::state::AppState;

use super::auth::UserResponse;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub client_id: Option<i64>,
}

/// Admin creates an account directly, bypassing company codes. A viewer
/// without an explicit tenant inherits the creating admin's tenant.
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    auth.require_admin()?;
    if payload.password.len() < 8 {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }

    let role = payload.role.unwrap_or_else(|| ROLE_VIEWER.to_string());
    if role != ROLE_ADMIN && role != ROLE_VIEWER {
        return Err(AppError::bad_request("role must be 'admin' or 'viewer'"));
    }
    let client_id = resolve_tenant(&role, payload.client_id, auth.client_id)?;

    let password_hash =
        password::hash_password(&payload.password).map_err(AppError::internal)?;

    let mut conn = state.db()?;
    let user = conn.transaction::<User, AppError, _>(|conn| {
        let already_taken = diesel::dsl::select(diesel::dsl::exists(
            users::table.filter(users::email.eq(&payload.email)),
        ))
        .get_result::<bool>(conn)?;
        if already_taken {
            return Err(AppError::bad_request("email is already registered"));
        }

        let id = sequence::next_id(conn, ENTITY_USER)?;
        let new_user = NewUser {
            id,
            email: payload.email.clone(),
            password_hash,
            role: role.clone(),
            client_id,
        };
        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(conn)?;
        Ok(users::table.find(id).first(conn)?)
    })?;

    super::auth::append_log(
        &mut conn,
        Some(auth.user_id),
        "user_created",
        json!({"user_id": user.id, "email": user.email, "role": user.role}),
    )?;
    info!(user_id = user.id, role = %user.role, "user created by admin");

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Decides the tenant of a new account. An explicit tenant wins, otherwise
/// the creator's tenant is inherited. Viewers must end up with a tenant;
/// only admins may be tenant-less.
pub(super) fn resolve_tenant(
    role: &str,
    explicit: Option<i64>,
    inherited: Option<i64>,
) -> Result<Option<i64>, AppError> {
    let resolved = explicit.or(inherited);
    if role == ROLE_VIEWER && resolved.is_none() {
        return Err(AppError::bad_request("a viewer account must belong to a client"));
    }
    Ok(resolved)
}
