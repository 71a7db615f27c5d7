//! Error types for voxrelay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for voxrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for voxrelay.
///
/// Every variant is rendered at the handler boundary; none of them escape
/// a single request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Error processing request: {0}")]
    Upstream(String),

    /// Rate-limited with nowhere to fail over to; callers should back off.
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("No audio data generated from TTS service")]
    EmptyAudio,

    #[error("Both speech API keys failed. Primary: {primary}; backup: {backup}")]
    FallbackFailed { primary: String, backup: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Config(_)
            | Error::Upstream(_)
            | Error::EmptyAudio
            | Error::FallbackFailed { .. }
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let body = serde_json::json!({
            "error": {
                "message": message,
                "type": "voxrelay_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
