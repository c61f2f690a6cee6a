use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::ratelimit::RateLimitResult;
use crate::store::StoreError;

/// One failing input field, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("weekly plan limit reached")]
    QuotaExceeded,

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("gone: {0}")]
    Gone(&'static str),

    #[error("rate limited")]
    RateLimited {
        limit: RateLimitResult,
        retry_after: u64,
        message: &'static str,
    },

    #[error("upstream generation failed: {0}")]
    Upstream(&'static str),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Validation failed", "details": details })),
            )
                .into_response(),
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            ApiError::InvalidSignature => error_body(StatusCode::BAD_REQUEST, "Invalid signature"),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized", "message": msg })),
            )
                .into_response(),
            ApiError::Forbidden(msg) => error_body(StatusCode::FORBIDDEN, &msg),
            ApiError::QuotaExceeded => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Weekly plan limit reached",
                    "message": "Upgrade to Pro for unlimited meal plans",
                })),
            )
                .into_response(),
            ApiError::NotFound(what) => error_body(StatusCode::NOT_FOUND, what),
            ApiError::Conflict(msg) => error_body(StatusCode::CONFLICT, &msg),
            ApiError::Gone(msg) => error_body(StatusCode::GONE, msg),
            ApiError::RateLimited {
                limit,
                retry_after,
                message,
            } => {
                let mut headers = HeaderMap::new();
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit.limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(limit.remaining));
                headers.insert("x-ratelimit-reset", HeaderValue::from(limit.reset));
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    headers,
                    Json(json!({
                        "error": "Too many requests",
                        "message": message,
                        "retryAfter": retry_after,
                    })),
                )
                    .into_response()
            }
            ApiError::Upstream(msg) => error_body(StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::NotConfigured(what) => error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                &format!("{} is not configured", what),
            ),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::QuotaExceeded => ApiError::QuotaExceeded,
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

fn error_body(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}
