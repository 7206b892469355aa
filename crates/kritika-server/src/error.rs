//! API error taxonomy.
//!
//! Write paths fail with a recoverable kind (validation, not-found,
//! conflict) or with a database/internal failure that surfaces as a 500
//! without detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or out-of-range input. The message names the offending field.
    #[error("{0}")]
    Validation(String),

    /// A referenced id or slug does not resolve.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation, e.g. a duplicate slug or a second review
    /// for the same (title, author) pair.
    #[error("{0}")]
    Conflict(String),

    /// Missing or unusable credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch this record.
    #[error("{0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a unique-key violation from an insert into `Conflict` with the
    /// given message. Any other database error passes through unchanged, so
    /// the constraint itself stays the source of truth for uniqueness.
    pub fn conflict_on_unique(err: DbErr, message: &str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ApiError::Conflict(message.to_string()),
            _ => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("year out of range".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("title").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict("slug already exists".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Database(DbErr::Custom("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_not_found() {
        let err = ApiError::NotFound("category");
        assert_eq!(err.to_string(), "category not found");
    }

    #[test]
    fn test_from_db_err() {
        let err: ApiError = DbErr::Custom("connection lost".into()).into();
        assert!(matches!(err, ApiError::Database(_)));
    }

    #[test]
    fn test_conflict_on_unique_passes_other_errors_through() {
        let err = ApiError::conflict_on_unique(DbErr::Custom("boom".into()), "duplicate");
        assert!(matches!(err, ApiError::Database(_)));
    }

    #[test]
    fn test_internal_message_is_not_leaked() {
        use axum::body::to_bytes;

        let resp = ApiError::Database(DbErr::Custom("secret dsn".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = tokio_test_block_on(to_bytes(resp.into_body(), usize::MAX)).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "internal server error");
    }

    // Small helper so the body check above doesn't need a tokio runtime attribute.
    fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }
}
