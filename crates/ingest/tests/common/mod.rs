//! Common test utilities for orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lakeside_core::config::HandlerConfig;
use lakeside_core::{Credentials, DeploymentDescriptor, DeploymentType, ProcessedPayload, Tag};
use lakeside_handlers::client::{ClientError, ClientResult};
use lakeside_handlers::memory::MemorySearchIndex;
use lakeside_handlers::opensearch::SearchIndex;
use lakeside_handlers::{HandlerRegistry, MemoryConnector};
use lakeside_ingest::{Orchestrator, PrometheusTelemetry};
use lakeside_staging::SqliteStagingStore;
use lakeside_storage::{MemoryBackend, ObjectMeta, ObjectStore, StorageError, StorageResult};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use uuid::Uuid;

pub const REGISTERED: [DeploymentType; 4] = [
    DeploymentType::Aws1,
    DeploymentType::Aws2,
    DeploymentType::Gcp1,
    DeploymentType::Azure1,
];

pub fn descriptor(deploy_type: DeploymentType) -> DeploymentDescriptor {
    let resources = match deploy_type {
        DeploymentType::Aws1 => json!({
            "s3": {"bucket_name": "blobs"},
            "opensearch": {"endpoint": "http://localhost:9200", "index": "blobs"}
        }),
        DeploymentType::Aws2 => json!({
            "s3": {"bucket_name": "blobs"},
            "dynamodb": {"table_name": "blobs"}
        }),
        DeploymentType::Gcp1 => json!({
            "bigquery": {"project": "test-project", "dataset": "lake", "table": "blobs"}
        }),
        DeploymentType::Azure1 => json!({
            "cosmos": {
                "endpoint": "https://lake.documents.azure.com",
                "database": "lake",
                "metadata_container": "metadata",
                "payload_container": "payloads"
            }
        }),
        DeploymentType::Gcp2 | DeploymentType::Gcp3 => json!({"bigtable": {"instance": "lake"}}),
    };

    DeploymentDescriptor {
        project_id: Uuid::new_v4(),
        deploy_type,
        resources,
        credentials: Credentials::Aws {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
            region: None,
        },
    }
}

pub fn json_payload(body: &'static [u8]) -> ProcessedPayload {
    ProcessedPayload::new(
        Bytes::from_static(body),
        vec![Tag::new("content-type", "application/json")],
    )
}

/// In-memory object store whose writes fail while switched on.
#[derive(Default)]
pub struct FlakyObjectStore {
    inner: MemoryBackend,
    failing: AtomicBool,
}

impl FlakyObjectStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FlakyObjectStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: Option<&str>) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("connection reset")));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// In-memory search index whose document writes fail while switched on.
#[derive(Default)]
pub struct FlakySearchIndex {
    inner: MemorySearchIndex,
    failing: AtomicBool,
}

impl FlakySearchIndex {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn document(&self, id: &str) -> Option<Value> {
        self.inner.document(id).await
    }
}

#[async_trait]
impl SearchIndex for FlakySearchIndex {
    async fn ensure_index(&self, mapping: &Value) -> ClientResult<()> {
        self.inner.ensure_index(mapping).await
    }

    async fn index_document(&self, id: &str, document: &Value) -> ClientResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 503,
                body: "cluster unavailable".to_string(),
            });
        }
        self.inner.index_document(id, document).await
    }

    async fn search(&self, body: &Value) -> ClientResult<Vec<Value>> {
        self.inner.search(body).await
    }

    async fn health_check(&self) -> ClientResult<()> {
        Ok(())
    }
}

/// An orchestrator over in-memory handlers and a temp SQLite staging store.
pub struct TestIngest {
    pub orchestrator: Orchestrator,
    pub connector: Arc<MemoryConnector>,
    pub objects: Arc<FlakyObjectStore>,
    pub index: Arc<FlakySearchIndex>,
    pub telemetry: Arc<PrometheusTelemetry>,
    _temp_dir: TempDir,
}

impl TestIngest {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let staging = SqliteStagingStore::new(temp_dir.path().join("staging.db"))
            .await
            .expect("Failed to open staging store");

        let objects = Arc::new(FlakyObjectStore::default());
        let index = Arc::new(FlakySearchIndex::default());
        let connector = Arc::new(
            MemoryConnector::new()
                .with_object_store(objects.clone())
                .with_search_index(index.clone()),
        );
        let registry = HandlerRegistry::in_memory(connector.clone(), &HandlerConfig::default());
        let telemetry =
            Arc::new(PrometheusTelemetry::new("lakeside").expect("Failed to create metrics"));

        let orchestrator =
            Orchestrator::new(Arc::new(staging), registry).with_telemetry(telemetry.clone());

        Self {
            orchestrator,
            connector,
            objects,
            index,
            telemetry,
            _temp_dir: temp_dir,
        }
    }

    pub fn metrics(&self) -> String {
        self.telemetry.encode().expect("Failed to encode metrics")
    }
}
