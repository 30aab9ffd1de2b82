//! Deployment `AZURE_1`: payload and metadata containers in one Cosmos DB
//! database.

pub mod client;
pub mod query;

use crate::client::{ClientResult, http_client};
use crate::connect::Connect;
use crate::error::{BackendOperation, HandlerError, HandlerResult};
use crate::handler::{BlobHandler, HandlerContext};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lakeside_core::{
    Blob, BlobMetadata, Credentials, DeploymentDescriptor, DeploymentType, ProcessedPayload, Tag,
};
use query::DocumentQuery;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub use client::CosmosClient;

const VARIANT: DeploymentType = DeploymentType::Azure1;

/// Container of a deployment's database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Container {
    /// Base64 payload documents.
    Payload,
    /// Searchable blob records.
    Metadata,
}

/// A document database with a payload and a metadata container.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace the document with the same `id`.
    async fn upsert(&self, container: Container, document: &Value) -> ClientResult<()>;

    /// Run a parameterized query, following continuations.
    async fn query(&self, container: Container, query: &DocumentQuery) -> ClientResult<Vec<Value>>;

    async fn health_check(&self) -> ClientResult<()>;
}

/// Resource payload of an `AZURE_1` deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct DocumentResources {
    pub cosmos: CosmosResource,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CosmosResource {
    pub endpoint: String,
    pub database: String,
    pub metadata_container: String,
    pub payload_container: String,
}

/// Payload document stored next to the metadata.
pub fn payload_document(blob: &BlobMetadata, payload: &ProcessedPayload) -> Value {
    json!({
        "id": blob.id.to_string(),
        "content_type": blob.content_type,
        "data": STANDARD.encode(&payload.data),
    })
}

/// Builds Cosmos DB clients from tenant credentials.
pub struct CosmosConnector {
    http: reqwest::Client,
}

impl CosmosConnector {
    pub fn new(http_timeout: Duration) -> HandlerResult<Self> {
        let http = http_client(http_timeout)
            .map_err(|e| HandlerError::InvalidDeployment(format!("HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Connect<Arc<dyn DocumentStore>> for CosmosConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<Arc<dyn DocumentStore>> {
        let resources: DocumentResources = deployment.resources()?;
        let Credentials::Azure { access_token, .. } = &deployment.credentials else {
            return Err(HandlerError::InvalidDeployment(format!(
                "{} requires azure credentials, got {}",
                deployment.deploy_type,
                deployment.credentials.provider()
            )));
        };

        let cosmos = &resources.cosmos;
        let client = CosmosClient::new(
            self.http.clone(),
            &cosmos.endpoint,
            &cosmos.database,
            &cosmos.payload_container,
            &cosmos.metadata_container,
            access_token,
        )
        .map_err(|e| HandlerError::InvalidDeployment(e.to_string()))?;

        Ok(Arc::new(client))
    }
}

/// Handler storing payload and metadata documents in Cosmos DB.
pub struct DocumentHandler {
    connector: Arc<dyn Connect<Arc<dyn DocumentStore>>>,
}

impl DocumentHandler {
    pub fn new(connector: Arc<dyn Connect<Arc<dyn DocumentStore>>>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl BlobHandler for DocumentHandler {
    fn deployment_type(&self) -> DeploymentType {
        VARIANT
    }

    #[instrument(skip_all, fields(deploy_type = %VARIANT, blob_id = %staged.id))]
    async fn finalize(
        &self,
        ctx: &HandlerContext<'_>,
        staged: &BlobMetadata,
        payload: &ProcessedPayload,
    ) -> HandlerResult<()> {
        let store = self.connector.connect(ctx.deployment).await?;
        let finalized = staged.finalize_with(payload);

        store
            .upsert(Container::Payload, &payload_document(&finalized, payload))
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::PayloadWrite, e))?;

        let record = serde_json::to_value(&finalized)
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;
        store
            .upsert(Container::Metadata, &record)
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;

        Ok(())
    }

    #[instrument(skip_all, fields(deploy_type = %VARIANT, tags = tags.len()))]
    async fn search(&self, ctx: &HandlerContext<'_>, tags: &[Tag]) -> HandlerResult<Vec<Blob>> {
        let query = query::translate(tags)?;
        let store = self.connector.connect(ctx.deployment).await?;

        let documents = store
            .query(Container::Metadata, &query)
            .await
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;

        let mut blobs = documents
            .into_iter()
            .map(serde_json::from_value::<Blob>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;
        blobs.sort_by_key(|blob| blob.id);
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeside_core::{BlobCreate, BlobId};

    #[test]
    fn test_payload_document_is_base64() {
        let meta = BlobMetadata::staged(BlobId::new(), BlobCreate::new("x"));
        let payload = ProcessedPayload::new(&b"hello"[..], vec![]);

        let doc = payload_document(&meta, &payload);
        assert_eq!(doc["id"], meta.id.to_string());
        assert_eq!(doc["data"], "aGVsbG8=");
        assert_eq!(doc["content_type"], "application/json");
    }
}
