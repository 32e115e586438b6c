use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::database::DatabaseError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    /// Rendered as `{"error": message}` with status 404.
    #[error("{0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest { code, message } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    code: code.to_string(),
                    message,
                    details: json!({}),
                }),
            )
                .into_response(),
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

/// Failure of a capability handler.
///
/// The `Display` text is what callers see: it is carried verbatim in `-32000`
/// JSON-RPC envelopes and in the `error` field of direct tool invocations.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("{0}")]
    Failed(String),
    #[error("handler panicked")]
    Panicked,
}

impl HandlerError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_message_is_passed_through() {
        let err = HandlerError::invalid_arguments("sql is required");
        assert_eq!(err.to_string(), "sql is required");

        let err = HandlerError::from(DatabaseError::Poisoned);
        assert_eq!(err.to_string(), DatabaseError::Poisoned.to_string());
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = AppError::not_found("missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let response = AppError::bad_request("invalid_json", "nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
