//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "LAKESIDE_";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub handlers: HandlerConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file, overridden by
    /// `LAKESIDE_`-prefixed environment variables (nested keys split on `__`,
    /// e.g. `LAKESIDE_STAGING__PATH`).
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                return Err(crate::Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections.
    pub fn validate(&self) -> crate::Result<()> {
        self.staging.validate().map_err(crate::Error::Config)?;
        self.handlers.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Staging store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StagingConfig {
    /// SQLite database (single node deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer LAKESIDE_STAGING__PASSWORD over storing this in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// PostgreSQL cancels statements exceeding this duration.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/staging.db"),
        }
    }
}

impl StagingConfig {
    /// Validate staging configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StagingConfig::Sqlite { .. } => Ok(()),
            StagingConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres max_connections must be at least 1".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Telemetry sink configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryConfig {
    /// Discard all telemetry.
    #[default]
    None,
    /// Emit telemetry as structured log events.
    Log,
    /// Record Prometheus counters and histograms.
    Prometheus {
        /// Metric name prefix.
        #[serde(default = "default_metrics_namespace")]
        namespace: String,
    },
}

fn default_metrics_namespace() -> String {
    "lakeside".to_string()
}

/// Settings shared by all backend handlers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Maximum number of results returned by search for backends with a
    /// server-side result cap.
    #[serde(default = "default_search_result_cap")]
    pub search_result_cap: usize,
    /// Timeout for HTTP-based index clients, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_search_result_cap() -> usize {
    1500
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            search_result_cap: default_search_result_cap(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl HandlerConfig {
    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.search_result_cap == 0 {
            return Err("handlers.search_result_cap must be at least 1".to_string());
        }
        if self.http_timeout_secs == 0 {
            return Err("handlers.http_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(matches!(config.staging, StagingConfig::Sqlite { .. }));
        assert_eq!(config.telemetry, TelemetryConfig::None);
        assert_eq!(config.handlers.search_result_cap, 1500);
        config.validate().unwrap();
    }

    #[test]
    fn test_postgres_requires_url_or_host_and_database() {
        let config = StagingConfig::Postgres {
            url: None,
            host: Some("db".to_string()),
            port: None,
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 4,
            statement_timeout_ms: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lakeside.toml");
        std::fs::write(
            &path,
            r#"
[staging]
type = "sqlite"
path = "/var/lib/lakeside/staging.db"

[telemetry]
type = "prometheus"

[handlers]
search_result_cap = 200
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        match config.staging {
            StagingConfig::Sqlite { path } => {
                assert_eq!(path, PathBuf::from("/var/lib/lakeside/staging.db"))
            }
            other => panic!("unexpected staging config: {other:?}"),
        }
        assert_eq!(
            config.telemetry,
            TelemetryConfig::Prometheus {
                namespace: "lakeside".to_string()
            }
        );
        assert_eq!(config.handlers.search_result_cap, 200);
        assert_eq!(config.handlers.http_timeout_secs, 30);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&temp.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_invalid_handler_config_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lakeside.toml");
        std::fs::write(&path, "[handlers]\nsearch_result_cap = 0\n").unwrap();

        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
