//! Error types for sheetdrop-core

use crate::response::StatusCode;
use thiserror::Error;

/// Result type alias for sheetdrop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the CSV export service
#[derive(Debug, Error)]
pub enum Error {
    /// Request body is not JSON, or not an array of arrays
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Per-request option rejected (bad filename or delimiter)
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Body over the configured limit. `declared` is the `Content-Length`
    /// when the client sent one.
    #[error("Body too large: limit is {limit} bytes")]
    BodyTooLarge { limit: usize, declared: Option<usize> },

    /// Startup configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status this error maps to when surfaced to a client
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MalformedInput(_) | Error::InvalidOption(_) => StatusCode::BAD_REQUEST,
            Error::InvalidMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Config(_) | Error::Csv(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller is at fault
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}
