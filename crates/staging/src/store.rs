//! Staging store trait and the SQLite implementation.

use crate::error::{StagingError, StagingResult};
use crate::models::StagedBlobRow;
use async_trait::async_trait;
use lakeside_core::{BlobId, BlobMetadata};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Write-ahead holding area for blob metadata between creation and
/// finalization.
///
/// The store is append/delete only: records are never mutated in place and
/// cannot be searched. A record is owned by the store until the caller has
/// written it to its target backend and deletes it here.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Persist a new staged record.
    ///
    /// Fails with [`StagingError::DuplicateId`] if a record with the same id
    /// is already staged.
    async fn create(&self, metadata: &BlobMetadata) -> StagingResult<BlobId>;

    /// Load a staged record.
    ///
    /// Fails with [`StagingError::NotFound`] if the id was never staged or
    /// has already been finalized.
    async fn get(&self, id: BlobId) -> StagingResult<BlobMetadata>;

    /// Delete a staged record. Deleting a missing id is not an error.
    async fn delete(&self, id: BlobId) -> StagingResult<()>;

    /// Run schema migrations.
    async fn migrate(&self) -> StagingResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StagingResult<()>;
}

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS staged_blobs (
    id BLOB PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT NOT NULL,
    user_tags TEXT NOT NULL,
    system_tags TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    staged_at TEXT NOT NULL
)
"#;

/// SQLite-based staging store.
pub struct SqliteStagingStore {
    pool: Pool<Sqlite>,
}

impl SqliteStagingStore {
    /// Open (or create) a SQLite staging database and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> StagingResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // SQLite permits limited write concurrency; a single connection avoids
        // "database is locked" failures under concurrent requests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::warn!(
            path = %path.display(),
            "SQLite staging store is intended for single-node deployments and tests; \
             use PostgreSQL when several ingest processes share a staging area"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn create(&self, metadata: &BlobMetadata) -> StagingResult<BlobId> {
        let row = StagedBlobRow::from_metadata(metadata, OffsetDateTime::now_utc())?;

        sqlx::query(
            r#"
            INSERT INTO staged_blobs (
                id, name, content_type, timestamp, source,
                user_tags, system_tags, size, staged_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.content_type)
        .bind(row.timestamp)
        .bind(&row.source)
        .bind(&row.user_tags)
        .bind(&row.system_tags)
        .bind(row.size)
        .bind(row.staged_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StagingError::from_insert(e, metadata.id))?;

        tracing::debug!(blob_id = %metadata.id, "blob staged");
        Ok(metadata.id)
    }

    async fn get(&self, id: BlobId) -> StagingResult<BlobMetadata> {
        let row = sqlx::query_as::<_, StagedBlobRow>("SELECT * FROM staged_blobs WHERE id = ?")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(StagingError::NotFound(id))?.into_metadata()
    }

    async fn delete(&self, id: BlobId) -> StagingResult<()> {
        let result = sqlx::query("DELETE FROM staged_blobs WHERE id = ?")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(blob_id = %id, "staged blob already gone");
        }
        Ok(())
    }

    async fn migrate(&self) -> StagingResult<()> {
        sqlx::query(SQLITE_SCHEMA).execute(&self.pool).await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_staged_blobs_staged_at ON staged_blobs (staged_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> StagingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
