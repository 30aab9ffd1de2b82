//! Deployment type to handler dispatch.

use crate::aws::AwsConnector;
use crate::bigquery::{BigQueryConnector, WarehouseHandler};
use crate::cosmos::{CosmosConnector, DocumentHandler};
use crate::dynamodb::KeyAttributeHandler;
use crate::error::{HandlerError, HandlerResult};
use crate::handler::BlobHandler;
use crate::memory::MemoryConnector;
use crate::opensearch::SearchEngineHandler;
use lakeside_core::config::HandlerConfig;
use lakeside_core::DeploymentType;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable map from deployment type to handler.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<DeploymentType, Arc<dyn BlobHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Registry of the cloud-backed handlers for `AWS_1`, `AWS_2`, `GCP_1`
    /// and `AZURE_1`.
    pub fn cloud(config: &HandlerConfig) -> HandlerResult<Self> {
        let aws = Arc::new(AwsConnector::new(config.http_timeout())?);
        let cosmos = Arc::new(CosmosConnector::new(config.http_timeout())?);
        let bigquery = Arc::new(BigQueryConnector::new(config.http_timeout())?);

        Ok(Self::builder()
            .register(Arc::new(SearchEngineHandler::new(
                aws.clone(),
                config.search_result_cap,
            )))
            .register(Arc::new(KeyAttributeHandler::new(aws)))
            .register(Arc::new(WarehouseHandler::new(bigquery)))
            .register(Arc::new(DocumentHandler::new(cosmos)))
            .build())
    }

    /// The same handlers backed by the in-memory backends of `connector`.
    pub fn in_memory(connector: Arc<MemoryConnector>, config: &HandlerConfig) -> Self {
        Self::builder()
            .register(Arc::new(SearchEngineHandler::new(
                connector.clone(),
                config.search_result_cap,
            )))
            .register(Arc::new(KeyAttributeHandler::new(connector.clone())))
            .register(Arc::new(WarehouseHandler::new(connector.clone())))
            .register(Arc::new(DocumentHandler::new(connector)))
            .build()
    }

    /// Look up the handler for a deployment type.
    pub fn resolve(&self, deploy_type: DeploymentType) -> HandlerResult<Arc<dyn BlobHandler>> {
        self.handlers
            .get(&deploy_type)
            .cloned()
            .ok_or_else(|| HandlerError::UnsupportedDeploymentType(deploy_type.to_string()))
    }

    /// Look up the handler for a deployment type identifier such as `AWS_1`.
    pub fn resolve_id(&self, id: &str) -> HandlerResult<Arc<dyn BlobHandler>> {
        let deploy_type: DeploymentType = id.parse()?;
        self.resolve(deploy_type)
    }

    /// Registered deployment types, in identifier order.
    pub fn deployment_types(&self) -> impl Iterator<Item = DeploymentType> + '_ {
        self.handlers.keys().copied()
    }
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: BTreeMap<DeploymentType, Arc<dyn BlobHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler under its own deployment type, replacing any
    /// handler registered earlier for that type.
    pub fn register(mut self, handler: Arc<dyn BlobHandler>) -> Self {
        let deploy_type = handler.deployment_type();
        if self.handlers.insert(deploy_type, handler).is_some() {
            tracing::warn!(deploy_type = %deploy_type, "replacing registered handler");
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::in_memory(Arc::new(MemoryConnector::new()), &HandlerConfig::default())
    }

    #[test]
    fn test_registered_types() {
        let types: Vec<_> = registry().deployment_types().collect();
        assert_eq!(
            types,
            vec![
                DeploymentType::Aws1,
                DeploymentType::Aws2,
                DeploymentType::Gcp1,
                DeploymentType::Azure1
            ]
        );
    }

    #[test]
    fn test_resolve_returns_matching_handler() {
        let registry = registry();
        for deploy_type in registry.deployment_types() {
            assert_eq!(registry.resolve(deploy_type).unwrap().deployment_type(), deploy_type);
        }
        assert_eq!(
            registry.resolve_id("AZURE_1").unwrap().deployment_type(),
            DeploymentType::Azure1
        );
    }

    #[test]
    fn test_recognized_but_unregistered_types_rejected() {
        let registry = registry();
        for deploy_type in [DeploymentType::Gcp2, DeploymentType::Gcp3] {
            match registry.resolve(deploy_type) {
                Err(HandlerError::UnsupportedDeploymentType(id)) => {
                    assert_eq!(id, deploy_type.as_str())
                }
                Err(other) => panic!("unexpected error: {other}"),
                Ok(_) => panic!("{deploy_type} should not resolve"),
            }
        }
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        assert!(matches!(
            registry().resolve_id("ONPREM_1"),
            Err(HandlerError::UnsupportedDeploymentType(_))
        ));
    }

    #[test]
    fn test_empty_registry_resolves_nothing() {
        let registry = HandlerRegistry::builder().build();
        assert!(registry.resolve(DeploymentType::Aws1).is_err());
    }

    #[tokio::test]
    async fn test_cloud_registry_builds() {
        let registry = HandlerRegistry::cloud(&HandlerConfig::default()).unwrap();
        assert_eq!(registry.deployment_types().count(), 4);
    }
}
