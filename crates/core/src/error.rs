//! Error types for llmgate

use thiserror::Error;

/// Result type alias for llmgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the llmgate control plane
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API request failed (create/delete Job or Service)
    #[error("Cluster API error: {0}")]
    Cluster(String),

    /// Worker health endpoint returned an unusable response
    #[error("Health probe error: {0}")]
    Health(String),

    /// Worker never reported ready within the stall timeout
    #[error("timed out waiting for worker {0} to become ready")]
    ReadinessTimeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
