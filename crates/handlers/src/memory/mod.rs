//! In-process backends for every registered deployment type.
//!
//! Each backend evaluates the native query artifact produced by its
//! translator (query DSL, scan filter values, bound parameters), so the
//! handlers run exactly the code paths they run against the real services.
//! Used for tests and local development.

mod documents;
mod search_index;
mod table;
mod warehouse;

pub use documents::MemoryDocumentStore;
pub use search_index::MemorySearchIndex;
pub use table::MemoryTable;
pub use warehouse::MemoryWarehouse;

use crate::bigquery::{Warehouse, WarehouseResources};
use crate::connect::Connect;
use crate::cosmos::{DocumentResources, DocumentStore};
use crate::dynamodb::{KeyAttributeBackends, KeyAttributeResources};
use crate::error::{HandlerError, HandlerResult};
use crate::opensearch::{SearchEngineBackends, SearchEngineResources, SearchIndex};
use async_trait::async_trait;
use lakeside_core::DeploymentDescriptor;
use lakeside_storage::{MemoryBackend, ObjectStore};
use std::sync::Arc;

/// Connector handing out shared in-memory backends.
///
/// Descriptors are still parsed, so malformed resource payloads fail the same
/// way they do with the cloud connectors. Every deployment connected through
/// one connector shares the same backends.
pub struct MemoryConnector {
    objects: Arc<dyn ObjectStore>,
    index: Arc<MemorySearchIndex>,
    search_engine: Arc<dyn SearchIndex>,
    table: Arc<MemoryTable>,
    documents: Arc<MemoryDocumentStore>,
    warehouse: Arc<MemoryWarehouse>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        let index = Arc::new(MemorySearchIndex::new());
        Self {
            objects: Arc::new(MemoryBackend::new()),
            search_engine: index.clone(),
            index,
            table: Arc::new(MemoryTable::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            warehouse: Arc::new(MemoryWarehouse::new(
                crate::bigquery::query::TableRef {
                    project: "local".to_string(),
                    dataset: "lakeside".to_string(),
                    table: "blobs".to_string(),
                },
            )),
        }
    }

    /// Use a different object store for the payloads of `AWS_1` and `AWS_2`.
    pub fn with_object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = objects;
        self
    }

    /// Use a different search index for `AWS_1`. [`Self::search_index`]
    /// keeps returning the built-in index.
    pub fn with_search_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.search_engine = index;
        self
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn search_index(&self) -> &MemorySearchIndex {
        &self.index
    }

    pub fn table(&self) -> &MemoryTable {
        &self.table
    }

    pub fn documents(&self) -> &MemoryDocumentStore {
        &self.documents
    }

    pub fn warehouse(&self) -> &MemoryWarehouse {
        &self.warehouse
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connect<SearchEngineBackends> for MemoryConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<SearchEngineBackends> {
        let _: SearchEngineResources = deployment.resources()?;
        Ok(SearchEngineBackends {
            objects: self.objects.clone(),
            index: self.search_engine.clone(),
        })
    }
}

#[async_trait]
impl Connect<KeyAttributeBackends> for MemoryConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<KeyAttributeBackends> {
        let resources: KeyAttributeResources = deployment.resources()?;
        if resources.dynamodb.table_name.is_empty() {
            return Err(HandlerError::InvalidDeployment(
                "dynamodb table_name must not be empty".to_string(),
            ));
        }
        Ok(KeyAttributeBackends {
            objects: self.objects.clone(),
            table: self.table.clone(),
        })
    }
}

#[async_trait]
impl Connect<Arc<dyn DocumentStore>> for MemoryConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<Arc<dyn DocumentStore>> {
        let _: DocumentResources = deployment.resources()?;
        Ok(self.documents.clone())
    }
}

#[async_trait]
impl Connect<Arc<dyn Warehouse>> for MemoryConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<Arc<dyn Warehouse>> {
        let resources: WarehouseResources = deployment.resources()?;
        resources
            .bigquery
            .table_ref()
            .validate()
            .map_err(HandlerError::InvalidDeployment)?;
        Ok(self.warehouse.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeside_core::{Credentials, DeploymentType};
    use serde_json::json;
    use uuid::Uuid;

    fn descriptor(deploy_type: DeploymentType, resources: serde_json::Value) -> DeploymentDescriptor {
        DeploymentDescriptor {
            project_id: Uuid::new_v4(),
            deploy_type,
            resources,
            credentials: Credentials::Gcp {
                project_id: "local".to_string(),
                access_token: "token".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_malformed_resources_rejected() {
        let connector = MemoryConnector::new();
        let d = descriptor(DeploymentType::Aws1, json!({"s3": {"bucket_name": "b"}}));

        let result = Connect::<SearchEngineBackends>::connect(&connector, &d).await;
        assert!(matches!(result, Err(HandlerError::InvalidDeployment(_))));
    }

    #[tokio::test]
    async fn test_invalid_table_identifier_rejected() {
        let connector = MemoryConnector::new();
        let d = descriptor(
            DeploymentType::Gcp1,
            json!({"bigquery": {"project": "p", "dataset": "d", "table": "t; DROP"}}),
        );

        let result = Connect::<Arc<dyn Warehouse>>::connect(&connector, &d).await;
        assert!(matches!(result, Err(HandlerError::InvalidDeployment(_))));
    }
}
