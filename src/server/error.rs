//! HTTP error responses
//!
//! Bodies are fixed strings. Internal details go to the log, never to
//! the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-level error type that maps to HTTP responses
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    /// Token or identifier rejected; the reason is deliberately not exposed
    #[error("Access denied: Invalid or tampered request")]
    Forbidden,

    #[error("File not found: The requested file no longer exists")]
    NotFound,

    /// The storage session is down
    #[error("Server error: Telegram client not connected")]
    Unavailable,

    /// All download slots are taken
    #[error("Server busy: Too many downloads in progress, try again later")]
    Busy,

    #[error("Internal Server Error")]
    Internal,
}

impl AppError {
    /// HTTP status for this error
    pub fn status(self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unavailable | AppError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
