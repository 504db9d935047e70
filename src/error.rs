//! Error types shared across the server
//!
//! `ErrorKind` is the wire-visible taxonomy every pipeline and protocol
//! failure collapses into. `AppError` is the HTTP surface error used by the
//! axum routes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy reported to clients in `error.data.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    FetchError,
    ValidationError,
    ExtractionError,
    ProtocolError,
    TimeoutError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchError => "FetchError",
            Self::ValidationError => "ValidationError",
            Self::ExtractionError => "ExtractionError",
            Self::ProtocolError => "ProtocolError",
            Self::TimeoutError => "TimeoutError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
