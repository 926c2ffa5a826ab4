//! Error types for protocol decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding wire values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The value does not have the expected structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// What was wrong.
        message: String,
    },

    /// The HTTP method is not one of the write methods.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
