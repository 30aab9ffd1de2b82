//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid blob id: {0}")]
    InvalidBlobId(String),

    #[error("unknown deployment type: {0}")]
    UnknownDeploymentType(String),

    #[error("invalid deployment: {0}")]
    InvalidDeployment(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
