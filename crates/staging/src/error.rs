//! Staging store error types.

use lakeside_core::BlobId;
use thiserror::Error;

/// Staging store operation errors.
#[derive(Debug, Error)]
pub enum StagingError {
    /// No staged record: the id never existed or was already finalized.
    #[error("staged blob not found: {0}")]
    NotFound(BlobId),

    /// Id collision on create. Ids are random UUIDs, so this indicates a
    /// broken id generator rather than a recoverable condition.
    #[error("staged blob already exists: {0}")]
    DuplicateId(BlobId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt staged record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StagingError {
    /// Map an insert failure, turning primary key violations into
    /// [`StagingError::DuplicateId`].
    pub(crate) fn from_insert(err: sqlx::Error, id: BlobId) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                tracing::error!(blob_id = %id, "staging id collision");
                Self::DuplicateId(id)
            }
            _ => Self::Database(err),
        }
    }
}

/// Result type for staging operations.
pub type StagingResult<T> = std::result::Result<T, StagingError>;
