/// Error types for Resize Service
///
/// `AppError` is the HTTP-facing error and renders the JSON error body.
/// Collaborator failures (`FetchError`, `ResizeError`) never reach the client
/// directly: the orchestrator turns them into per-image failure results.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

/// Result type for resize-service HTTP operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request body or query
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Image absent, failed, or the wait for it timed out
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body returned to API clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error, error_type, code) = match self {
            AppError::BadRequest(_) => ("Bad Request", "validation_error", "INVALID_REQUEST"),
            AppError::NotFound(_) => ("Not Found", "not_found_error", "IMAGE_NOT_FOUND"),
            AppError::Internal(_) => ("Internal Server Error", "server_error", "INTERNAL_SERVER_ERROR"),
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
            error_type: error_type.to_string(),
            code: code.to_string(),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Failure to retrieve a source image
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Failure to decode, resize or re-encode an image
#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode JPEG: {0}")]
    Encode(String),

    #[error("Target size {width}x{height} exceeds the {limit}px limit")]
    TooLarge { width: u32, height: u32, limit: u32 },

    #[error("Resize task aborted: {0}")]
    Aborted(String),
}

/// Failure of one fetch+resize unit
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resize(#[from] ResizeError),

    #[error("Processing timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Cache adapter errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache already shut down")]
    Closed,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name} must not exceed {limit}")]
    TooLarge { name: &'static str, limit: usize },
}
