//! Gateway-local error types mapped directly onto the HTTP status codes in
//! the spec's `/eval` table. Validation errors never reach the Queue or
//! Bus; they're rejected in the handler before any side effect runs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("source_text exceeds the {0} byte limit")]
    SourceTooLarge(u64),
    #[error("language_tag {0:?} is not supported")]
    UnsupportedLanguage(String),
    #[error("timeout_s must be between {min} and {max}, got {got}")]
    TimeoutOutOfRange { min: u32, max: u32, got: u32 },
    #[error("request body exceeds the {0} byte limit")]
    RequestTooLarge(u64),
    #[error("queue depth exceeds the configured high-water mark")]
    Overloaded,
    #[error("upstream infrastructure unavailable: {0}")]
    Infrastructure(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let status = match &self {
            SubmitError::SourceTooLarge(_) | SubmitError::RequestTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            SubmitError::UnsupportedLanguage(_) | SubmitError::TimeoutOutOfRange { .. } => {
                StatusCode::BAD_REQUEST
            }
            SubmitError::Overloaded | SubmitError::Infrastructure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("evaluation {0} not found")]
    NotFound(uuid::Uuid),
    #[error("runner unreachable for evaluation {0}")]
    RunnerUnavailable(uuid::Uuid),
    #[error("upstream infrastructure error: {0}")]
    Infrastructure(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RunnerUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
