//! JWT issuance/verification, password hashing and the authenticated-user
//! extractor.
//!
//! Route authorization is data-driven: the extractor matches the request's
//! route template and method against the permission table and requires the
//! caller's role to hold that permission. The superuser role bypasses the
//! check; routes without a permission row are open to any authenticated
//! user.

use axum::extract::{FromRequestParts, MatchedPath};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::config::Config;
use crate::entities::User;
use crate::entities::role::ADMIN_ROLE_SLUG;
use crate::errors::AppError;
use crate::orm::{Entity, EntityQuery};

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

/// Login/refresh response body.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

fn issue_token(config: &Config, user_id: i64, token_type: &str, ttl: i64) -> Result<String, AppError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        token_type: token_type.to_string(),
        iat: now,
        exp: now + ttl,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::TokenInvalid)
}

pub fn issue_token_pair(config: &Config, user_id: i64) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        access_token: issue_token(config, user_id, TOKEN_TYPE_ACCESS, config.access_token_ttl)?,
        refresh_token: issue_token(config, user_id, TOKEN_TYPE_REFRESH, config.refresh_token_ttl)?,
        token_type: "Bearer",
        expires_in: config.access_token_ttl,
    })
}

/// Decode and validate a token, additionally requiring the expected type so
/// a refresh token cannot be replayed as an access token.
pub fn verify_token(config: &Config, token: &str, expected_type: &str) -> Result<Claims, AppError> {
    let decoded = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::TokenInvalid)?;
    if decoded.claims.token_type != expected_type {
        return Err(AppError::TokenInvalid);
    }
    Ok(decoded.claims)
}

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Validation(format!("password hashing failed: {e}")))
}

pub fn verify_password(plain: &str, hashed: &str) -> bool {
    bcrypt::verify(plain, hashed).unwrap_or(false)
}

/// The authenticated caller, resolved from the bearer token and authorized
/// against the matched route.
pub struct AuthUser(pub User);

async fn role_has_permission(
    state: &AppState,
    role_id: i64,
    url: &str,
    method: &str,
) -> Result<bool, AppError> {
    // No permission row means the route is not guarded.
    let permission_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM permission WHERE url = ? AND method = ?")
            .bind(url)
            .bind(method)
            .fetch_optional(&state.db)
            .await?;
    let Some(permission_id) = permission_id else {
        return Ok(true);
    };
    let attached: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM role_permission WHERE role_id = ? AND permission_id = ? LIMIT 1",
    )
    .bind(role_id)
    .bind(&permission_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(attached.is_some())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;
        let claims = verify_token(&state.config, token, TOKEN_TYPE_ACCESS)?;

        let user = EntityQuery::<User>::new()
            .where_eq(User::PRIMARY_KEY, claims.sub.into())
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::TokenInvalid)?;
        if !user.is_active {
            return Err(AppError::PermissionDeny);
        }

        let role: Option<(i64, String)> = match user.role_id {
            Some(role_id) => {
                sqlx::query_as("SELECT id, slug FROM role WHERE id = ?")
                    .bind(role_id)
                    .fetch_optional(&state.db)
                    .await?
            }
            None => None,
        };

        if let Some((_, slug)) = &role {
            if slug == ADMIN_ROLE_SLUG {
                return Ok(AuthUser(user));
            }
        }

        let url = parts
            .extensions
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let method = parts.method.as_str().to_string();

        let allowed = match &role {
            Some((role_id, _)) => role_has_permission(state, *role_id, &url, &method).await?,
            None => role_has_permission_for_none(state, &url, &method).await?,
        };
        if !allowed {
            return Err(AppError::PermissionDeny);
        }
        Ok(AuthUser(user))
    }
}

/// A user without a role may only reach unguarded routes.
async fn role_has_permission_for_none(
    state: &AppState,
    url: &str,
    method: &str,
) -> Result<bool, AppError> {
    let guarded: Option<String> =
        sqlx::query_scalar("SELECT id FROM permission WHERE url = ? AND method = ?")
            .bind(url)
            .bind(method)
            .fetch_optional(&state.db)
            .await?;
    Ok(guarded.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let config = Config::for_tests();
        let pair = issue_token_pair(&config, 7).unwrap();
        assert_eq!(pair.token_type, "Bearer");

        let claims = verify_token(&config, &pair.access_token, TOKEN_TYPE_ACCESS).unwrap();
        assert_eq!(claims.sub, 7);

        // a refresh token is not an access token
        assert!(verify_token(&config, &pair.refresh_token, TOKEN_TYPE_ACCESS).is_err());
        assert!(verify_token(&config, &pair.refresh_token, TOKEN_TYPE_REFRESH).is_ok());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let config = Config::for_tests();
        let pair = issue_token_pair(&config, 7).unwrap();
        let mut other = Config::for_tests();
        other.jwt_secret = "different".to_string();
        assert!(verify_token(&other, &pair.access_token, TOKEN_TYPE_ACCESS).is_err());
    }

    #[test]
    fn test_password_hashing() {
        let hashed = hash_password("s3cret").unwrap();
        assert_ne!(hashed, "s3cret");
        assert!(verify_password("s3cret", &hashed));
        assert!(!verify_password("wrong", &hashed));
    }
}
