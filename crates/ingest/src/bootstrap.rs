//! Process setup: tracing and a configured orchestrator.

use crate::error::{IngestError, IngestResult};
use crate::orchestrator::Orchestrator;
use lakeside_core::config::AppConfig;
use lakeside_handlers::HandlerRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`. Does
/// nothing if a subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Build an orchestrator with the cloud handlers from configuration.
///
/// Opens (and migrates) the staging store and verifies it is reachable before
/// returning.
pub async fn build(config: &AppConfig) -> IngestResult<Orchestrator> {
    config.validate()?;

    let staging = lakeside_staging::from_config(&config.staging).await?;
    staging.health_check().await?;
    tracing::info!("Staging store initialized");

    let registry = HandlerRegistry::cloud(&config.handlers)?;
    let telemetry = crate::telemetry::from_config(&config.telemetry)?;
    tracing::info!(
        deployment_types = registry.deployment_types().count(),
        "Handler registry initialized"
    );

    Ok(Orchestrator::new(staging, registry).with_telemetry(telemetry))
}

/// Load configuration from an optional file and the environment, then build.
pub async fn build_from_env(path: Option<&std::path::Path>) -> IngestResult<Orchestrator> {
    let config = AppConfig::load(path).map_err(|e| IngestError::Config(e.to_string()))?;
    build(&config).await
}
