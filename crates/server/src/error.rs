//! Error types for the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mirror_lib::MirrorError;
use serde::Serialize;
use thiserror::Error;

/// Errors returned to a single HTTP caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure inside the mirror, e.g. snapshot serialization.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// Anything else that is the server's fault.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match &self {
            Self::Mirror(MirrorError::Serialization(_)) => "serialization_error",
            Self::Mirror(_) | Self::Internal(_) => "internal_error",
        };

        let body = ErrorResponse {
            error,
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "application/json")],
            json,
        )
            .into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Mirror(MirrorError::Serialization(err))
    }
}
