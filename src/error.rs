//! Error types for babelstream

use thiserror::Error;

/// Result type alias using [`EngineError`]
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for the engine layer
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP request error (connection, DNS, TLS, malformed response)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider rejected the request or reported a stream-level error
    #[error("provider error: {0}")]
    Provider(String),

    /// A frame in the stream could not be decoded
    #[error("failed to parse stream frame: {0}")]
    ParseFrame(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is missing or invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request was cancelled by the caller
    #[error("request cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}
