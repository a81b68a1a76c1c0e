//! Error types for the pdfedit server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfedit_core::EditorError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    PageOutOfRange(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    CorruptDocument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "FILE_NOT_FOUND"),
            ServerError::PageOutOfRange(_) => (StatusCode::BAD_REQUEST, "PAGE_OUT_OF_RANGE"),
            ServerError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT"),
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ServerError::CorruptDocument(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CORRUPT_DOCUMENT")
            }
            ServerError::Internal(msg) => {
                error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EditorError> for ServerError {
    fn from(err: EditorError) -> Self {
        match err {
            EditorError::NotFound(name) => ServerError::NotFound(name),
            EditorError::PageOutOfRange { .. } => ServerError::PageOutOfRange(err.to_string()),
            EditorError::UnsupportedFormat(_) => ServerError::UnsupportedFormat(err.to_string()),
            EditorError::Validation(msg) => ServerError::InvalidRequest(msg),
            EditorError::Corrupt(_) => ServerError::CorruptDocument(err.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}
