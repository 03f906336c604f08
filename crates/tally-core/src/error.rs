//! Error types for Tally core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the CLI and chat layers map
//! these to user-friendly messages.

use thiserror::Error;

/// Result type alias for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Core error type for Tally operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Data validation error (bad condition value, mismatched amounts, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Pending action found but past its expiry timestamp
    #[error("Expired: {0}")]
    Expired(String),

    /// Short confirmation code does not match the stored code
    #[error("Invalid code: {0}")]
    CodeMismatch(String),

    /// Classifier/renderer/transport failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Classifier returned an intent outside the known set
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),
}

impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        TallyError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Validation(err.to_string())
    }
}

impl From<rusqlite::Error> for TallyError {
    fn from(err: rusqlite::Error) -> Self {
        TallyError::Storage(format!("SQLite error: {}", err))
    }
}
