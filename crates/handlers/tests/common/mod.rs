//! Common test utilities for handler tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lakeside_core::config::HandlerConfig;
use lakeside_core::{
    Blob, BlobCreate, BlobId, BlobMetadata, Credentials, DeploymentDescriptor, DeploymentType,
    ProcessedPayload, Tag,
};
use lakeside_handlers::{HandlerContext, HandlerRegistry, HandlerResult, MemoryConnector};
use lakeside_staging::{SqliteStagingStore, StagingStore};
use lakeside_storage::{ObjectMeta, ObjectStore, StorageError, StorageResult};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use time::macros::datetime;
use uuid::Uuid;

/// Deployment types with a registered handler.
pub const REGISTERED: [DeploymentType; 4] = [
    DeploymentType::Aws1,
    DeploymentType::Aws2,
    DeploymentType::Gcp1,
    DeploymentType::Azure1,
];

/// A well-formed descriptor for `deploy_type`.
pub fn descriptor(deploy_type: DeploymentType) -> DeploymentDescriptor {
    let aws = Credentials::Aws {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        session_token: None,
        region: None,
    };
    let (resources, credentials) = match deploy_type {
        DeploymentType::Aws1 => (
            json!({
                "s3": {"bucket_name": "blobs"},
                "opensearch": {"endpoint": "http://localhost:9200", "index": "blobs"}
            }),
            aws,
        ),
        DeploymentType::Aws2 => (
            json!({
                "s3": {"bucket_name": "blobs"},
                "dynamodb": {"table_name": "blobs"}
            }),
            aws,
        ),
        DeploymentType::Gcp1 => (
            json!({"bigquery": {"project": "test-project", "dataset": "lake", "table": "blobs"}}),
            Credentials::Gcp {
                project_id: "test-project".to_string(),
                access_token: "token".to_string(),
            },
        ),
        DeploymentType::Azure1 => (
            json!({
                "cosmos": {
                    "endpoint": "https://lake.documents.azure.com",
                    "database": "lake",
                    "metadata_container": "metadata",
                    "payload_container": "payloads"
                }
            }),
            Credentials::Azure {
                tenant_id: "tenant".to_string(),
                access_token: "token".to_string(),
            },
        ),
        DeploymentType::Gcp2 | DeploymentType::Gcp3 => (json!({"bigtable": {}}), aws),
    };

    DeploymentDescriptor {
        project_id: Uuid::new_v4(),
        deploy_type,
        resources,
        credentials,
    }
}

/// In-memory handlers with a SQLite staging store in a temp directory.
pub struct TestBed {
    pub connector: Arc<MemoryConnector>,
    pub registry: HandlerRegistry,
    pub staging: Arc<dyn StagingStore>,
    _temp_dir: TempDir,
}

impl TestBed {
    pub async fn new() -> Self {
        Self::with(MemoryConnector::new(), HandlerConfig::default()).await
    }

    pub async fn with(connector: MemoryConnector, config: HandlerConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let staging = SqliteStagingStore::new(temp_dir.path().join("staging.db"))
            .await
            .expect("Failed to open staging store");
        let connector = Arc::new(connector);

        Self {
            registry: HandlerRegistry::in_memory(connector.clone(), &config),
            connector,
            staging: Arc::new(staging),
            _temp_dir: temp_dir,
        }
    }

    pub async fn finalize(
        &self,
        deployment: &DeploymentDescriptor,
        staged: &BlobMetadata,
        payload: &ProcessedPayload,
    ) -> HandlerResult<()> {
        let handler = self.registry.resolve(deployment.deploy_type)?;
        let ctx = HandlerContext::new(deployment, self.staging.as_ref());
        handler.finalize(&ctx, staged, payload).await
    }

    pub async fn search(
        &self,
        deployment: &DeploymentDescriptor,
        tags: &[Tag],
    ) -> HandlerResult<Vec<Blob>> {
        let handler = self.registry.resolve(deployment.deploy_type)?;
        let ctx = HandlerContext::new(deployment, self.staging.as_ref());
        handler.search(&ctx, tags).await
    }
}

/// Staged metadata with a fixed id and timestamp.
pub fn staged(n: u128, name: &str, user_tags: Vec<Tag>, system_tags: Vec<Tag>) -> BlobMetadata {
    let create = BlobCreate {
        timestamp: datetime!(2024-06-01 09:15:00 UTC),
        ..BlobCreate::new(name)
    }
    .with_source("test")
    .with_user_tags(user_tags)
    .with_system_tags(system_tags);

    BlobMetadata::staged(BlobId::from(Uuid::from_u128(n)), create)
}

pub fn json_payload(body: &'static [u8]) -> ProcessedPayload {
    ProcessedPayload::new(
        Bytes::from_static(body),
        vec![Tag::new("content-type", "application/json")],
    )
}

/// Object store whose writes always fail.
pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, _key: &str, _data: Bytes, _content_type: Option<&str>) -> StorageResult<()> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
