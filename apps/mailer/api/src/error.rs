//! JSON error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use email::EmailError;
use messaging::QueueError;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Error body returned by every endpoint.
///
/// ```json
/// {
///   "code": 1001,
///   "error": "VALIDATION_ERROR",
///   "message": "subject: subject must be between 1 to 50 characters",
///   "details": { "subject": [ ... ] }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Integer error code for logging and monitoring
    pub code: i32,
    /// Machine-readable error identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    InvalidJson,
    PublishFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidJson => "INVALID_JSON",
            Self::PublishFailed => "PUBLISH_FAILED",
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::ValidationError => 1001,
            Self::InvalidJson => 1010,
            Self::PublishFailed => 1012,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Publish(#[from] QueueError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::Email(EmailError::Json(e)) => {
                tracing::info!(error_code = ErrorCode::InvalidJson.code(), error = %e, "Rejected email body");
                (StatusCode::BAD_REQUEST, ErrorCode::InvalidJson, e.to_string(), None)
            }
            ApiError::Email(EmailError::Invalid(e)) => {
                tracing::info!(error_code = ErrorCode::ValidationError.code(), error = %e, "Rejected email");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::ValidationError,
                    e.to_string(),
                    serde_json::to_value(&e).ok(),
                )
            }
            ApiError::Publish(e) => {
                tracing::error!(error_code = ErrorCode::PublishFailed.code(), error = %e, "Failed to queue email");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::PublishFailed,
                    "Failed to queue email".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code.code(),
            error: code.as_str().to_string(),
            message,
            details,
        });
        (status, body).into_response()
    }
}
