//! Staging store for Lakeside.
//!
//! A staged record bridges the create call, which must return an id before
//! any payload exists, and the finalize call, which supplies the payload
//! later. Backends:
//! - SQLite (single node, tests)
//! - PostgreSQL

pub mod error;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::{StagingError, StagingResult};
pub use postgres::{PgParams, PostgresStagingStore};
pub use store::{SqliteStagingStore, StagingStore};

use lakeside_core::config::StagingConfig;
use std::sync::Arc;

/// Create a staging store from configuration.
pub async fn from_config(config: &StagingConfig) -> StagingResult<Arc<dyn StagingStore>> {
    config.validate().map_err(StagingError::Config)?;

    match config {
        StagingConfig::Sqlite { path } => {
            let store = SqliteStagingStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn StagingStore>)
        }
        StagingConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let store = if let Some(url) = url {
                tracing::info!("Connecting staging store to PostgreSQL using connection URL");
                PostgresStagingStore::from_url(url, *max_connections, *statement_timeout_ms)
                    .await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                let params = PgParams {
                    host,
                    port: port.unwrap_or(5432),
                    username: username.as_deref(),
                    password: password.as_deref(),
                    database,
                    ssl_mode: *ssl_mode,
                };
                PostgresStagingStore::from_params(params, *max_connections, *statement_timeout_ms)
                    .await?
            } else {
                return Err(StagingError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn StagingStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("staging.db");
        let config = StagingConfig::Sqlite {
            path: db_path.clone(),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_rejects_incomplete_postgres() {
        let config = StagingConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: Some("lakeside".to_string()),
            ssl_mode: None,
            max_connections: 4,
            statement_timeout_ms: None,
        };

        match from_config(&config).await {
            Err(StagingError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }
}
