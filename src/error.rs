//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Version conflict: concurrent modification detected")]
    VersionConflict,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { .. } => AppError::VersionConflict,
            StoreError::NotFound { aggregate, id } => {
                AppError::Domain(DomainError::NotFound { aggregate, id })
            }
            other => AppError::Store(other),
        }
    }
}

impl AppError {
    /// Check if the caller may simply retry the command
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::VersionConflict => true,
            AppError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 409 Conflict
            AppError::VersionConflict => (StatusCode::CONFLICT, "version_conflict", None),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => {
                let details = Some(domain_err.to_string());
                match domain_err {
                    DomainError::SelfRelation(_) => {
                        (StatusCode::BAD_REQUEST, "self_relation", details)
                    }
                    DomainError::InvalidInput(_) => {
                        (StatusCode::BAD_REQUEST, "invalid_input", details)
                    }
                    DomainError::NotOwner { .. } => (StatusCode::FORBIDDEN, "not_owner", details),
                    DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", details),
                    DomainError::Deleted { .. } => (StatusCode::GONE, "deleted", details),
                    DomainError::InvalidTransition { .. } => {
                        (StatusCode::CONFLICT, "invalid_transition", details)
                    }
                    DomainError::AlreadyActive(_) => {
                        (StatusCode::CONFLICT, "already_active", details)
                    }
                    DomainError::AlreadyExists(_) => {
                        (StatusCode::CONFLICT, "already_exists", details)
                    }
                }
            }

            // 500 Internal Server Error
            AppError::Store(StoreError::DuplicateKey(key)) => {
                (StatusCode::CONFLICT, "duplicate_key", Some(key.clone()))
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.status_and_code();

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
