//! Crate-wide error taxonomy.
//!
//! `ServiceError` is the error type every component in this crate returns.
//! It is deliberately narrow: one variant per category a caller needs to
//! branch on (retry, surface to a user, page an operator), not one variant
//! per failing call site.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// The reason a `Conflict` occurred, so callers can distinguish "already
/// done, nothing to do" from a genuine write conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    AlreadyConfirmed,
    AlreadyReleased,
    IdempotencyReplay,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict ({reason:?}): {message}")]
    Conflict {
        reason: ConflictReason,
        message: String,
    },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("zone not initialized: {0}")]
    ZoneUninitialized(String),

    #[error("queue admission required: {0}")]
    QueueRequired(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ServiceError::Internal(err.to_string())
    }

    /// Whether a caller should treat this as transient and safe to retry
    /// after a backoff, as opposed to a permanent rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::DependencyUnavailable(_) | ServiceError::DeadlineExceeded(_)
        )
    }
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        error!(error = %err, "database error");
        ServiceError::Internal(err.to_string())
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        error!(error = %err, "redis error");
        ServiceError::DependencyUnavailable(format!("redis: {err}"))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("serialization error: {err}"))
    }
}

impl From<jsonwebtoken::errors::Error> for ServiceError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("queue pass expired".to_string())
            }
            _ => ServiceError::Unauthorized(format!("invalid queue pass: {err}")),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            ServiceError::QuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
            ServiceError::InsufficientStock(_) => {
                (StatusCode::CONFLICT, "insufficient_stock")
            }
            ServiceError::ZoneUninitialized(_) => {
                (StatusCode::FAILED_DEPENDENCY, "zone_uninitialized")
            }
            ServiceError::QueueRequired(_) => (StatusCode::FORBIDDEN, "queue_required"),
            ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ServiceError::DeadlineExceeded(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded")
            }
            ServiceError::DependencyUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "dependency_unavailable")
            }
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            error!(error = %self, "internal error");
        }

        (
            status,
            Json(json!({ "error": code, "message": self.to_string() })),
        )
            .into_response()
    }
}

/// Errors that can occur while standing up the process, before any
/// component has a chance to produce a `ServiceError`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("connection error: {0}")]
    Connection(String),
}
