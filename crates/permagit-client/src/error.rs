//! Error types for HTTP collaborators.

use thiserror::Error;

/// Client-specific errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request could not be sent or the response not read.
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered with a failure status.
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Remote answered with something unexpected.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing or unusable wallet credential.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Encryption or key unwrapping failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
