//! Crate-wide error type and its HTTP envelope.
//!
//! Every fallible operation in the domain returns `Result<T, AppError>`. The
//! envelope shape and error codes mirror spec §6/§7: `{error, code, message,
//! details?}` plus the HTTP status each code maps to.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("content generation failed ({operation}): {message}")]
    ContentGeneration { operation: String, message: String },

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Translates storage-layer failures into the HTTP-facing kinds from spec
/// §7 — "already exists" and "not found" surface distinctly rather than
/// collapsing into a generic 500 (spec §4.I point 2).
impl From<crate::storage::StorageError> for AppError {
    fn from(err: crate::storage::StorageError) -> Self {
        use crate::storage::StorageError;
        match err {
            StorageError::NotFound { entity, id } => AppError::NotFound(format!("{entity} {id}")),
            StorageError::AlreadyExists { entity, detail } => {
                AppError::Conflict(format!("{entity} {detail}"))
            }
            StorageError::Validation { entity, detail } => {
                AppError::Validation(format!("{entity}: {detail}"))
            }
            StorageError::Backend(message) => AppError::Repository(message),
        }
    }
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::ContentGeneration { .. } => "content_generation_failed",
            AppError::Conflict(_) => "already_exists",
            AppError::Repository(_) => "internal",
            AppError::BrokerUnavailable(_) => "internal",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ContentGeneration { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::ContentGeneration { operation, .. } => {
                Some(serde_json::json!({ "operation": operation }))
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }

        let mut response = (
            status,
            Json(ErrorEnvelope {
                error: true,
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            }),
        )
            .into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}
