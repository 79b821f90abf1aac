// Error types for the core crate

use thiserror::Error;

/// Errors raised while encoding or decoding log lines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The line is not a JSON object of the expected shape
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The embedded timestamp could not be parsed
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Serialization failed while encoding
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
