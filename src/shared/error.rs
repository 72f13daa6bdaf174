//! Application Error Types
//!
//! Centralized error taxonomy with Axum integration.
//!
//! Every failure in the gateway falls into one of three kinds:
//! - `Validation`: the request itself was rejected (authorization, conflicts)
//! - `DataProcess`: a domain lookup failed (scope or account not found)
//! - `System`: unexpected transport, database, or cache failure
//!
//! Each error carries a severity used for log routing. Gateway-internal
//! failures are logged and surfaced to the single caller; they never take
//! down the process or other connections.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Broad failure category, mirrored in API error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Input or authorization rejected; the caller can correct and retry.
    Validation,
    /// A domain lookup failed (scope, account, or session not found).
    DataProcess,
    /// Unexpected transport, database, or cache failure.
    System,
}

/// Severity attached to an error, used when logging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Information,
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Classify the error into the platform taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_)
            | AppError::Unauthorized(_)
            | AppError::Forbidden(_)
            | AppError::Conflict(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::DataProcess,
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Serialization(_) => ErrorKind::System,
        }
    }

    /// Severity for log routing.
    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::Validation => Severity::Information,
            ErrorKind::DataProcess => Severity::Warning,
            ErrorKind::System => Severity::Critical,
        }
    }

    /// Whether a read-only operation hitting this error may be retried.
    ///
    /// Only transient system failures qualify; validation and lookup
    /// failures are deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Redis(_))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        let body = ErrorResponse {
            kind: self.kind(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
