//! Handler error types.

use lakeside_core::DeploymentType;
use lakeside_staging::StagingError;
use std::fmt;
use thiserror::Error;

/// Boxed error from a backend client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Backend operation that failed, so object and index failures are
/// distinguishable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendOperation {
    /// Payload write to an object store.
    ObjectPut,
    /// Payload write to a payload container or table.
    PayloadWrite,
    /// Searchable record write.
    IndexWrite,
    /// Tag query.
    IndexQuery,
}

impl BackendOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectPut => "object_put",
            Self::PayloadWrite => "payload_write",
            Self::IndexWrite => "index_write",
            Self::IndexQuery => "index_query",
        }
    }
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag query that cannot be expressed in a backend's native form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("tag at position {position} has an empty name")]
    EmptyTagName { position: usize },

    #[error("query needs {clauses} boolean clauses, limit is {limit}")]
    TooManyClauses { clauses: usize, limit: usize },

    #[error("filter expression is {length} bytes, limit is {limit}")]
    ExpressionTooLong { length: usize, limit: usize },
}

/// Handler operation errors.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("{variant} {operation} failed: {source}")]
    BackendWrite {
        variant: DeploymentType,
        operation: BackendOperation,
        #[source]
        source: BoxError,
    },

    #[error("{variant} {operation} failed: {source}")]
    BackendRead {
        variant: DeploymentType,
        operation: BackendOperation,
        #[source]
        source: BoxError,
    },

    #[error("translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("invalid deployment: {0}")]
    InvalidDeployment(String),

    #[error("unsupported deployment type: {0}")]
    UnsupportedDeploymentType(String),
}

impl HandlerError {
    pub fn write(
        variant: DeploymentType,
        operation: BackendOperation,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::BackendWrite {
            variant,
            operation,
            source: source.into(),
        }
    }

    pub fn read(
        variant: DeploymentType,
        operation: BackendOperation,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::BackendRead {
            variant,
            operation,
            source: source.into(),
        }
    }

    /// The failed backend operation, if this is a backend failure.
    pub fn operation(&self) -> Option<BackendOperation> {
        match self {
            Self::BackendWrite { operation, .. } | Self::BackendRead { operation, .. } => {
                Some(*operation)
            }
            _ => None,
        }
    }
}

impl From<lakeside_core::Error> for HandlerError {
    fn from(err: lakeside_core::Error) -> Self {
        match err {
            lakeside_core::Error::UnknownDeploymentType(id) => Self::UnsupportedDeploymentType(id),
            other => Self::InvalidDeployment(other.to_string()),
        }
    }
}

/// Result type for handler operations.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_name_variant_and_operation() {
        let err = HandlerError::write(
            DeploymentType::Aws1,
            BackendOperation::IndexWrite,
            "connection refused",
        );
        assert_eq!(err.to_string(), "AWS_1 index_write failed: connection refused");
        assert_eq!(err.operation(), Some(BackendOperation::IndexWrite));
    }

    #[test]
    fn test_core_errors_map_to_deployment_errors() {
        let err: HandlerError = lakeside_core::Error::UnknownDeploymentType("X".into()).into();
        assert!(matches!(err, HandlerError::UnsupportedDeploymentType(_)));

        let err: HandlerError = lakeside_core::Error::InvalidDeployment("bad".into()).into();
        assert!(matches!(err, HandlerError::InvalidDeployment(_)));
    }
}
