//! Common error types for npm-bisect.

use thiserror::Error;

/// Common error type for npm-bisect operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid filter spec: {spec} - {reason}")]
    InvalidFilterSpec { spec: String, reason: String },

    #[error("Proxy bind failed: {0}")]
    ProxyBind(String),

    #[error("Upstream registry request failed: {0}")]
    Upstream(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
