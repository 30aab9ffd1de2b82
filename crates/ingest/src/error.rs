//! Ingestion error types.

use lakeside_core::BlobId;
use lakeside_handlers::HandlerError;
use lakeside_staging::StagingError;
use thiserror::Error;

/// Errors returned by the orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No staged record for the id: never created, or already finalized.
    #[error("staged blob not found: {0}")]
    NotFound(BlobId),

    #[error("unsupported deployment type: {0}")]
    UnsupportedDeploymentType(String),

    #[error("invalid deployment: {0}")]
    InvalidDeployment(String),

    #[error(transparent)]
    Handler(HandlerError),

    #[error("staging error: {0}")]
    Staging(StagingError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IngestError {
    /// Short label for the error kind, used in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::UnsupportedDeploymentType(_) => "unsupported_deployment_type",
            Self::InvalidDeployment(_) => "invalid_deployment",
            Self::Handler(HandlerError::BackendWrite { .. }) => "backend_write",
            Self::Handler(HandlerError::BackendRead { .. }) => "backend_read",
            Self::Handler(HandlerError::Translation(_)) => "translation",
            Self::Handler(_) => "handler",
            Self::Staging(_) => "staging",
            Self::Config(_) => "config",
            Self::Metrics(_) => "metrics",
        }
    }
}

impl From<StagingError> for IngestError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::NotFound(id) => Self::NotFound(id),
            other => Self::Staging(other),
        }
    }
}

impl From<HandlerError> for IngestError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::UnsupportedDeploymentType(id) => Self::UnsupportedDeploymentType(id),
            HandlerError::InvalidDeployment(reason) => Self::InvalidDeployment(reason),
            HandlerError::Staging(err) => err.into(),
            other => Self::Handler(other),
        }
    }
}

impl From<lakeside_core::Error> for IngestError {
    fn from(err: lakeside_core::Error) -> Self {
        match err {
            lakeside_core::Error::UnknownDeploymentType(id) => Self::UnsupportedDeploymentType(id),
            lakeside_core::Error::InvalidDeployment(reason) => Self::InvalidDeployment(reason),
            other => Self::Config(other.to_string()),
        }
    }
}

/// Result type for ingestion operations.
pub type IngestResult<T> = std::result::Result<T, IngestError>;
