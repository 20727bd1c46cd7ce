//! Error taxonomy for the speaker-identification service.
//!
//! Every fallible operation in this crate eventually resolves to an [`AppError`],
//! which carries exactly the vocabulary §7 of the design calls for and knows how to
//! render itself as an HTTP response or an SSE `error` event.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error kind, surfaced at the HTTP boundary and in SSE `error` events.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InsufficientSpeech(String),

    #[error("{0}")]
    NotFound(String),

    #[error("identification already in progress for this device")]
    Busy,

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::InsufficientSpeech(_) => "insufficient_speech",
            AppError::NotFound(_) => "not_found",
            AppError::Busy => "busy",
            AppError::ProviderError(_) => "provider_error",
            AppError::ProviderTimeout(_) => "provider_timeout",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientSpeech(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Busy => StatusCode::CONFLICT,
            AppError::ProviderError(_) | AppError::ProviderTimeout(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client. `Internal` never leaks its detail here;
    /// the detail is logged by `into_response` instead.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Render as the body of a terminal SSE `error` event (§4.9).
    pub fn to_sse_payload(&self) -> serde_json::Value {
        serde_json::json!({ "message": self.public_message() })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(err) => tracing::error!(error = %err, "internal error"),
            other => tracing::warn!(error = %other, "request failed"),
        }
        let status = self.status();
        let body = ErrorBody {
            error: self.kind(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
