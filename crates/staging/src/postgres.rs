//! PostgreSQL-based staging store implementation.

use crate::error::{StagingError, StagingResult};
use crate::models::StagedBlobRow;
use crate::store::StagingStore;
use async_trait::async_trait;
use lakeside_core::config::PgSslMode;
use lakeside_core::{BlobId, BlobMetadata};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Connection parameters for [`PostgresStagingStore::from_params`].
#[derive(Debug, Clone)]
pub struct PgParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub database: &'a str,
    pub ssl_mode: Option<PgSslMode>,
}

/// PostgreSQL-based staging store.
pub struct PostgresStagingStore {
    pool: Pool<Postgres>,
}

impl PostgresStagingStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StagingResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    pub async fn from_params(
        params: PgParams<'_>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StagingResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(params.host)
            .port(params.port)
            .database(params.database);

        if let Some(user) = params.username {
            opts = opts.username(user);
        }

        if let Some(pass) = params.password {
            opts = opts.password(pass);
        }

        if let Some(mode) = params.ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = params.host,
            port = params.port,
            database = params.database,
            username = params.username.unwrap_or("<none>"),
            ssl_mode = ?params.ssl_mode,
            "Connecting staging store to PostgreSQL"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StagingResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl StagingStore for PostgresStagingStore {
    async fn create(&self, metadata: &BlobMetadata) -> StagingResult<BlobId> {
        let row = StagedBlobRow::from_metadata(metadata, OffsetDateTime::now_utc())?;

        sqlx::query(
            r#"
            INSERT INTO staged_blobs (
                id, name, content_type, timestamp, source,
                user_tags, system_tags, size, staged_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        let row =
            sqlx::query_as::<_, StagedBlobRow>("SELECT * FROM staged_blobs WHERE id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or(StagingError::NotFound(id))?.into_metadata()
    }

    async fn delete(&self, id: BlobId) -> StagingResult<()> {
        sqlx::query("DELETE FROM staged_blobs WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn migrate(&self) -> StagingResult<()> {
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> StagingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_skip_comments() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS staged_blobs"));
        assert!(statements[1].contains("CREATE INDEX IF NOT EXISTS"));
    }
}
