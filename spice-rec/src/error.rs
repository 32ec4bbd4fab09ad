//! Error types for spice-rec
//!
//! [`PipelineError`] is what a recommendation run can fail with;
//! [`ApiError`] is its HTTP rendering, with body
//! `{"error": {"code": ..., "message": ...}}`.

use crate::services::catalog::UpstreamError;
use crate::services::credentials::CredentialError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failures that end a recommendation run
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    /// Every upstream call of a stage was refused for credential reasons
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Merged candidate pool was empty
    #[error("Could not find any similar tracks. Please check your song information.")]
    NoCandidates,

    #[error(transparent)]
    Upstream(UpstreamError),
}

impl From<UpstreamError> for PipelineError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Credential(cred) => PipelineError::Credential(cred),
            UpstreamError::Validation { message, .. } => PipelineError::Validation(message),
            other => PipelineError::Upstream(other),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Nothing found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream refused our credentials (401)
    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// Upstream rejected the request with a 4xx (502)
    #[error("Upstream request failed ({status}): {message}")]
    UpstreamRequest { status: u16, message: String },

    /// Upstream throttled us (429)
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Upstream unreachable or not configured (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Unclassified upstream failure (500)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        let message = err.to_string();
        match err {
            UpstreamError::Validation { message, .. } => ApiError::BadRequest(message),
            UpstreamError::Credential(cred) => ApiError::from(cred),
            UpstreamError::RateLimited { retry_after, .. } => ApiError::RateLimited {
                message,
                retry_after,
            },
            UpstreamError::Request { status, message, .. } => {
                ApiError::UpstreamRequest { status, message }
            }
            UpstreamError::Unavailable { .. } => ApiError::Unavailable(message),
            UpstreamError::Upstream { .. } => ApiError::Upstream(message),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        ApiError::UpstreamAuth(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(message) => ApiError::BadRequest(message),
            PipelineError::Credential(cred) => ApiError::from(cred),
            PipelineError::NoCandidates => ApiError::NotFound(PipelineError::NoCandidates.to_string()),
            PipelineError::Upstream(upstream) => ApiError::from(upstream),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut upstream_status = None;

        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::UpstreamAuth(msg) => {
                (StatusCode::UNAUTHORIZED, "UPSTREAM_AUTH_FAILED", msg)
            }
            ApiError::UpstreamRequest { status, message } => {
                upstream_status = Some(status);
                (StatusCode::BAD_GATEWAY, "UPSTREAM_REQUEST_FAILED", message)
            }
            ApiError::RateLimited {
                message,
                retry_after: after,
            } => {
                retry_after = after;
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
            }
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE", msg)
            }
            ApiError::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(upstream) = upstream_status {
            error["upstreamStatus"] = json!(upstream);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();

        if let Some(after) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
