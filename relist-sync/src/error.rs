//! Error types for relist-sync
//!
//! - `TransportError`: one failed HTTP exchange (never a rate limit)
//! - `SyncError`: anything that can end a job, a stage or a run
//! - `ApiError`: HTTP API handler errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Transport-level failure of a single request
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Non-2xx response other than 429
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// Response body was not the expected JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

impl TransportError {
    /// HTTP status, when the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sync engine errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Authorization declined or token unavailable
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Run cancelled explicitly
    #[error("Sync cancelled")]
    Cancelled,

    /// Settings snapshot the engine cannot run with
    #[error("Invalid sync settings: {0}")]
    InvalidSettings(String),

    /// A job panicked inside a worker
    #[error("Worker failed: {0}")]
    Worker(String),

    /// The worker pool was cancelled before the job produced a response
    #[error("Worker pool closed before job {0} completed")]
    PoolClosed(u64),

    /// A job produced an output of the wrong kind
    #[error("Unexpected job output: expected {expected}, got {actual}")]
    UnexpectedOutput {
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Common(#[from] relist_common::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the outer retry wrapper may re-run after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Authorization(_)
            | SyncError::Cancelled
            | SyncError::InvalidSettings(_) => false,
            SyncError::Transport(TransportError::Status { status, .. }) => *status != 401,
            _ => true,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a sync is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] relist_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::Authorization("declined".into()).is_retryable());
        assert!(!SyncError::InvalidSettings("days must be at least 1".into()).is_retryable());
        assert!(SyncError::Transport(TransportError::Network("reset".into())).is_retryable());
        assert!(SyncError::Transport(TransportError::Status {
            status: 502,
            message: "Bad gateway".into()
        })
        .is_retryable());
        assert!(!SyncError::Transport(TransportError::Status {
            status: 401,
            message: "The access token expired".into()
        })
        .is_retryable());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Status {
            status: 404,
            message: "Non existing id".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404: Non existing id");
        assert_eq!(err.status(), Some(404));
    }
}
