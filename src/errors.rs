//! Application error taxonomy and HTTP mapping.
//!
//! All repository enforcement errors are structured (entity display name,
//! field names, offending values) so the HTTP layer can render a localized
//! message instead of leaking raw storage failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::i18n::{Locale, already_exists_message, not_found_message};

#[derive(Debug, Error)]
pub enum AppError {
    /// A referenced entity, foreign key or related id does not exist.
    #[error("{entity} with {field} {value} not found")]
    NotFound {
        entity: String,
        field: String,
        value: String,
        locale: Locale,
    },

    /// A unique-constraint group is already occupied.
    #[error("{entity} with {fields} {values} already exists")]
    AlreadyExists {
        entity: String,
        fields: String,
        values: String,
        locale: Locale,
    },

    /// Metadata reflection against the storage engine failed.
    #[error("schema introspection failed")]
    SchemaIntrospection(#[source] sqlx::Error),

    #[error("authentication required")]
    Unauthorized,

    #[error("token is invalid or expired")]
    TokenInvalid,

    #[error("permission denied")]
    PermissionDeny,

    #[error("{0}")]
    Validation(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn not_found(
        locale: Locale,
        entity: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        AppError::NotFound {
            entity: entity.into(),
            field: field.into(),
            value: value.to_string(),
            locale,
        }
    }

    pub fn already_exists(
        locale: Locale,
        entity: impl Into<String>,
        fields: impl Into<String>,
        values: impl Into<String>,
    ) -> Self {
        AppError::AlreadyExists {
            entity: entity.into(),
            fields: fields.into(),
            values: values.into(),
            locale,
        }
    }

    /// Remap a storage-level unique violation that slipped through the
    /// pre-flight check window into the same structured error the check
    /// would have produced. Everything else passes through untouched.
    pub fn from_write_error(e: sqlx::Error, locale: Locale, entity: &str) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                // SQLite reports "UNIQUE constraint failed: table.col, ..."
                let detail = db
                    .message()
                    .rsplit(':')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                return AppError::already_exists(locale, entity, detail, String::new());
            }
        }
        AppError::Database(e)
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::AlreadyExists { .. } => StatusCode::CONFLICT,
            AppError::SchemaIntrospection(_) | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Unauthorized | AppError::TokenInvalid => StatusCode::UNAUTHORIZED,
            AppError::PermissionDeny => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::NOT_ACCEPTABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::NotFound {
                entity,
                field,
                value,
                locale,
            } => not_found_message(*locale, entity, field, value),
            AppError::AlreadyExists {
                entity,
                fields,
                values,
                locale,
            } => already_exists_message(*locale, entity, fields, values),
            // Infrastructure faults stay generic towards clients.
            AppError::SchemaIntrospection(_) | AppError::Database(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, source = ?self, "request failed");
        }
        let body = Json(json!({
            "code": status.as_u16(),
            "data": null,
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let e = AppError::not_found(Locale::EnUs, "User", "id", 42);
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
        let e = AppError::already_exists(Locale::EnUs, "User", "email", "a@b.c");
        assert_eq!(e.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::PermissionDeny.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_localized_messages() {
        let e = AppError::not_found(Locale::ZhCn, "用户", "id", 42);
        assert_eq!(e.message(), "id为42的用户不存在");
        let e = AppError::not_found(Locale::EnUs, "User", "id", 42);
        assert_eq!(e.message(), "User with id 42 not found");
    }
}
