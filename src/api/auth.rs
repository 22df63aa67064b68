//! Login, token refresh and the current-user endpoint.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::{self, AuthUser, TOKEN_TYPE_REFRESH, TokenPair};
use crate::entities::User;
use crate::errors::AppError;
use crate::orm::{Entity, EntityQuery, RelationLoader, now_iso8601};

use super::BaseResponse;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address or phone number.
    pub account: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

async fn find_by_account(state: &AppState, account: &str) -> Result<Option<User>, AppError> {
    let by_email = EntityQuery::<User>::new()
        .where_eq("email", account.into())
        .fetch_optional(&state.db)
        .await?;
    if by_email.is_some() {
        return Ok(by_email);
    }
    Ok(EntityQuery::<User>::new()
        .where_eq("phone", account.into())
        .fetch_optional(&state.db)
        .await?)
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<BaseResponse<TokenPair>>, AppError> {
    let user = find_by_account(&state, &body.account)
        .await?
        .ok_or(AppError::Unauthorized)?;
    // Same rejection for a bad password and an unknown account.
    if !auth::verify_password(&body.password, &user.password) {
        return Err(AppError::Unauthorized);
    }
    if !user.is_active {
        return Err(AppError::PermissionDeny);
    }
    sqlx::query("UPDATE user SET last_login = ? WHERE id = ?")
        .bind(now_iso8601())
        .bind(user.id)
        .execute(&state.db)
        .await?;
    tracing::info!(user_id = user.id, "login succeeded");
    Ok(BaseResponse::ok(auth::issue_token_pair(
        &state.config,
        user.id,
    )?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<BaseResponse<TokenPair>>, AppError> {
    let claims = auth::verify_token(&state.config, &body.refresh_token, TOKEN_TYPE_REFRESH)?;
    let user = EntityQuery::<User>::new()
        .where_eq(User::PRIMARY_KEY, claims.sub.into())
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::TokenInvalid)?;
    if !user.is_active {
        return Err(AppError::PermissionDeny);
    }
    Ok(BaseResponse::ok(auth::issue_token_pair(
        &state.config,
        user.id,
    )?))
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<BaseResponse<User>>, AppError> {
    let mut single = [user];
    User::load_relations(&mut single, &state.db, &["group", "role"]).await?;
    let [user] = single;
    Ok(BaseResponse::ok(user))
}
