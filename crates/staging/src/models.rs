//! Database models mapping to the staging schema.

use crate::error::{StagingError, StagingResult};
use lakeside_core::{BlobId, BlobMetadata, Tag};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Staged blob record. Tag sets are stored as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct StagedBlobRow {
    pub id: Uuid,
    pub name: String,
    pub content_type: String,
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub user_tags: String,
    pub system_tags: String,
    pub size: i64,
    /// When the record was staged. Lets an external reaper find abandoned
    /// records; nothing in this crate reads it.
    pub staged_at: OffsetDateTime,
}

impl StagedBlobRow {
    pub fn from_metadata(meta: &BlobMetadata, staged_at: OffsetDateTime) -> StagingResult<Self> {
        let size = i64::try_from(meta.size).map_err(|_| StagingError::Corrupt {
            id: meta.id.to_string(),
            reason: format!("size {} does not fit the schema", meta.size),
        })?;

        Ok(Self {
            id: *meta.id.as_uuid(),
            name: meta.name.clone(),
            content_type: meta.content_type.clone(),
            timestamp: meta.timestamp,
            source: meta.source.clone(),
            user_tags: serde_json::to_string(&meta.user_tags)?,
            system_tags: serde_json::to_string(&meta.system_tags)?,
            size,
            staged_at,
        })
    }

    pub fn into_metadata(self) -> StagingResult<BlobMetadata> {
        let id = self.id.to_string();
        let size = u64::try_from(self.size).map_err(|_| StagingError::Corrupt {
            id: id.clone(),
            reason: format!("negative size {}", self.size),
        })?;
        let user_tags: Vec<Tag> = parse_tags(&id, "user_tags", &self.user_tags)?;
        let system_tags: Vec<Tag> = parse_tags(&id, "system_tags", &self.system_tags)?;

        Ok(BlobMetadata {
            id: BlobId::from(self.id),
            name: self.name,
            content_type: self.content_type,
            timestamp: self.timestamp,
            source: self.source,
            user_tags,
            system_tags,
            size,
        })
    }
}

fn parse_tags(id: &str, column: &str, raw: &str) -> StagingResult<Vec<Tag>> {
    serde_json::from_str(raw).map_err(|e| StagingError::Corrupt {
        id: id.to_string(),
        reason: format!("{column}: {e}"),
    })
}
