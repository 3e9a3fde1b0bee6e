//! Common error types for the hearing screening service

use thiserror::Error;

/// Common result type for screening operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the core algorithms and the service boundary
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input (missing respondent id, malformed request)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Numeric input outside its permitted range (e.g. tone frequency)
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Unknown session or respondent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transition attempted in the wrong state (e.g. submit after completion)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Persisted state that cannot be interpreted
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

