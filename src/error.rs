//! Error types for edvs_tracking.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A constructor precondition was violated.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// A text event line could not be parsed.
    #[error("malformed event line {line:?}: {reason}")]
    ParseEvent { line: String, reason: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for edvs_tracking operations.
pub type Result<T> = std::result::Result<T, Error>;
