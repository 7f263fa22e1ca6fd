//! HTTP error mapping
//!
//! Every handler returns `ApiResult<T>`. Errors render as
//! `{"code": "...", "message": "...", "details": ...}`; 5xx causes are logged
//! and replaced with a generic message.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;
use crate::db::table_data::FilterError;
use crate::domain::aggregates::{FieldViolation, SchemaError, SettingValueError};
use crate::import::ImportError;
use crate::StoreOpsError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {message}")]
    Validation { message: String, details: Option<serde_json::Value> },

    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), details: None }
    }

    pub fn invalid(message: impl Into<String>, details: impl Serialize) -> Self {
        Self::Validation { message: message.into(), details: serde_json::to_value(details).ok() }
    }

    pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }

    pub fn forbidden(message: impl Into<String>) -> Self { Self::Forbidden(message.into()) }

    pub fn conflict(message: impl Into<String>) -> Self { Self::Conflict(message.into()) }

    /// Same message for unknown users and wrong passwords.
    pub fn invalid_credentials() -> Self { Self::Unauthorized("Invalid username or password".into()) }

    pub fn admin_required() -> Self { Self::Forbidden("Admin role required".into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Validation { message, .. } => message.clone(),
            Self::Unauthorized(m) | Self::Forbidden(m) | Self::Conflict(m) => m.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Database(e) => {
                error!(target: "database", error = %e, "Database error occurred");
                "Database error".to_string()
            }
            Self::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                "Internal server error".to_string()
            }
        };
        let details = match &self {
            Self::Validation { details, .. } => details.as_ref(),
            _ => None,
        };
        let body = ErrorBody { code: self.code(), message: &message, details };
        (status, Json(body)).into_response()
    }
}

/// Unique violations surface as 409 so duplicate names race-safely report a conflict.
pub fn map_db_error(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            let what = db.constraint().unwrap_or("unique constraint").to_string();
            return ApiError::Conflict(format!("Duplicate value violates {what}"));
        }
        if db.code().as_deref() == Some("23503") {
            return ApiError::bad_request("Referenced record does not exist or is still in use");
        }
    }
    ApiError::Database(e)
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self { map_db_error(e) }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::invalid("Request validation failed", &e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("Multipart error: {e}"))
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::ExpiredToken => Self::Unauthorized("Token expired".into()),
            AuthError::InvalidToken(_) => Self::Unauthorized("Invalid token".into()),
            AuthError::GenerationFailed(msg) | AuthError::Hash(msg) => Self::Internal(msg),
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(e: SchemaError) -> Self { Self::bad_request(e.to_string()) }
}

impl From<SettingValueError> for ApiError {
    fn from(e: SettingValueError) -> Self { Self::bad_request(e.to_string()) }
}

impl From<FilterError> for ApiError {
    fn from(e: FilterError) -> Self { Self::bad_request(e.to_string()) }
}

impl From<Vec<FieldViolation>> for ApiError {
    fn from(violations: Vec<FieldViolation>) -> Self {
        let message = violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        Self::invalid(format!("Row does not match the table schema: {message}"), &violations)
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Storage(db) => map_db_error(db),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<StoreOpsError> for ApiError {
    fn from(e: StoreOpsError) -> Self {
        match e {
            StoreOpsError::Schema(e) => e.into(),
            StoreOpsError::Import(e) => e.into(),
            StoreOpsError::Auth(e) => e.into(),
            StoreOpsError::Storage(e) => map_db_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_carries_details() {
        let error: ApiError = vec![FieldViolation::new("price", "required field is missing")].into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "validation_error");
        assert_eq!(json["details"][0]["field"], "price");
    }

    #[tokio::test]
    async fn test_internal_error_is_not_leaked() {
        let response = ApiError::Internal("connection string with password".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Internal server error");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::not_found("Shop").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(AuthError::ExpiredToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(map_db_error(sqlx::Error::RowNotFound).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
