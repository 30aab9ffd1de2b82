//! Common test utilities for staging stores.

use lakeside_core::{BlobCreate, BlobId, BlobMetadata, Tag};
use lakeside_staging::{SqliteStagingStore, StagingResult, StagingStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::macros::datetime;

/// A SQLite staging store in a temp directory that is removed on drop.
pub struct TestStaging {
    pub store: Arc<dyn StagingStore>,
    _temp_dir: TempDir,
}

impl TestStaging {
    pub async fn new() -> StagingResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStagingStore::new(temp_dir.path().join("staging.db")).await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn StagingStore> {
        self.store.clone()
    }
}

/// Staged metadata with a fixed whole-second timestamp.
pub fn sample_metadata(name: &str) -> BlobMetadata {
    let create = BlobCreate {
        timestamp: datetime!(2024-03-01 12:30:00 UTC),
        ..BlobCreate::new(name)
    }
    .with_source("sensor-7")
    .with_user_tags(vec![Tag::new("env", "prod"), Tag::bare("draft")])
    .with_system_tags(vec![Tag::new("origin", "api")]);

    BlobMetadata::staged(BlobId::new(), create)
}
