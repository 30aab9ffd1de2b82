//! Blob identifiers, staged metadata and search results.

use crate::tag::Tag;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a blob.
///
/// Generated once at creation time and used as the object key, the index
/// document id and the staging primary key in every backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Generate a new random blob ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidBlobId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BlobId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated create request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobCreate {
    pub name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub user_tags: Vec<Tag>,
    #[serde(default)]
    pub system_tags: Vec<Tag>,
}

fn default_content_type() -> String {
    crate::DEFAULT_CONTENT_TYPE.to_string()
}

impl BlobCreate {
    /// Create a request with defaults for everything except the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: default_content_type(),
            timestamp: OffsetDateTime::now_utc(),
            source: String::new(),
            user_tags: Vec::new(),
            system_tags: Vec::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_user_tags(mut self, tags: Vec<Tag>) -> Self {
        self.user_tags = tags;
        self
    }

    pub fn with_system_tags(mut self, tags: Vec<Tag>) -> Self {
        self.system_tags = tags;
        self
    }
}

/// Blob metadata as staged between creation and finalization, and as written
/// to the searchable record of a backend once finalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub id: BlobId,
    pub name: String,
    pub content_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub user_tags: Vec<Tag>,
    pub system_tags: Vec<Tag>,
    /// Payload size in bytes. Zero until finalized.
    pub size: u64,
}

impl BlobMetadata {
    /// Build the staged record for a create request.
    pub fn staged(id: BlobId, create: BlobCreate) -> Self {
        Self {
            id,
            name: create.name,
            content_type: create.content_type,
            timestamp: create.timestamp,
            source: create.source,
            user_tags: create.user_tags,
            system_tags: create.system_tags,
            size: 0,
        }
    }

    /// Derive the finalized record: payload system tags are appended to the
    /// staged ones and the size is the payload byte length.
    ///
    /// The staged record is left untouched, so deriving twice from the same
    /// staged record and payload yields identical results.
    pub fn finalize_with(&self, payload: &ProcessedPayload) -> Self {
        let mut system_tags = Vec::with_capacity(self.system_tags.len() + payload.system_tags.len());
        system_tags.extend(self.system_tags.iter().cloned());
        system_tags.extend(payload.system_tags.iter().cloned());

        Self {
            system_tags,
            size: payload.len(),
            ..self.clone()
        }
    }

    /// Whether this record satisfies every requested tag.
    pub fn matches(&self, tags: &[Tag]) -> bool {
        crate::tag::matches_all(tags, &self.user_tags, &self.system_tags)
    }
}

/// A finalized blob as returned by search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: BlobId,
    pub name: String,
    pub content_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub user_tags: Vec<Tag>,
    pub system_tags: Vec<Tag>,
    pub size: u64,
}

impl From<BlobMetadata> for Blob {
    fn from(meta: BlobMetadata) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            content_type: meta.content_type,
            timestamp: meta.timestamp,
            source: meta.source,
            user_tags: meta.user_tags,
            system_tags: meta.system_tags,
            size: meta.size,
        }
    }
}

/// Output of the content pipeline: raw bytes plus the tags it derived.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessedPayload {
    pub data: Bytes,
    pub system_tags: Vec<Tag>,
}

impl ProcessedPayload {
    pub fn new(data: impl Into<Bytes>, system_tags: Vec<Tag>) -> Self {
        Self {
            data: data.into(),
            system_tags,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
