//! Deployment `AWS_1`: S3 payloads with an OpenSearch index.

pub mod client;
pub mod query;

use crate::aws::BucketResource;
use crate::client::ClientResult;
use crate::connect::Connect;
use crate::error::{BackendOperation, HandlerError, HandlerResult};
use crate::handler::{BlobHandler, HandlerContext};
use async_trait::async_trait;
use lakeside_core::{Blob, BlobMetadata, DeploymentType, ProcessedPayload, Tag};
use lakeside_storage::ObjectStore;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

pub use client::OpenSearchClient;

const VARIANT: DeploymentType = DeploymentType::Aws1;

/// A search index accepting documents by id and queries in the OpenSearch DSL.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with `mapping` unless it already exists. An existing
    /// index keeps its mapping.
    async fn ensure_index(&self, mapping: &Value) -> ClientResult<()>;

    /// Create or replace the document stored under `id`.
    async fn index_document(&self, id: &str, document: &Value) -> ClientResult<()>;

    /// Run a search request body and return the `_source` of every hit.
    async fn search(&self, body: &Value) -> ClientResult<Vec<Value>>;

    async fn health_check(&self) -> ClientResult<()>;
}

/// Clients for one `AWS_1` deployment.
#[derive(Clone)]
pub struct SearchEngineBackends {
    pub objects: Arc<dyn ObjectStore>,
    pub index: Arc<dyn SearchIndex>,
}

/// Resource payload of an `AWS_1` deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct SearchEngineResources {
    pub s3: BucketResource,
    pub opensearch: OpenSearchResource,
}

#[derive(Clone, Deserialize)]
pub struct OpenSearchResource {
    pub endpoint: String,
    pub index: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for OpenSearchResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchResource")
            .field("endpoint", &self.endpoint)
            .field("index", &self.index)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Handler storing payloads in S3 and searchable records in OpenSearch.
pub struct SearchEngineHandler {
    connector: Arc<dyn Connect<SearchEngineBackends>>,
    result_cap: usize,
}

impl SearchEngineHandler {
    pub fn new(connector: Arc<dyn Connect<SearchEngineBackends>>, result_cap: usize) -> Self {
        Self {
            connector,
            result_cap,
        }
    }
}

#[async_trait]
impl BlobHandler for SearchEngineHandler {
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
        let backends = self.connector.connect(ctx.deployment).await?;
        let finalized = staged.finalize_with(payload);
        let key = finalized.id.to_string();

        backends
            .objects
            .put(&key, payload.data.clone(), Some(&finalized.content_type))
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::ObjectPut, e))?;

        let document = serde_json::to_value(&finalized)
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;
        backends
            .index
            .ensure_index(&query::index_mapping())
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;
        backends
            .index
            .index_document(&key, &document)
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;

        Ok(())
    }

    #[instrument(skip_all, fields(deploy_type = %VARIANT, tags = tags.len()))]
    async fn search(&self, ctx: &HandlerContext<'_>, tags: &[Tag]) -> HandlerResult<Vec<Blob>> {
        let body = query::translate(tags, self.result_cap)?;
        let backends = self.connector.connect(ctx.deployment).await?;

        backends
            .index
            .ensure_index(&query::index_mapping())
            .await
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;
        let hits = backends
            .index
            .search(&body)
            .await
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;

        let mut blobs = hits
            .into_iter()
            .map(serde_json::from_value::<Blob>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;
        blobs.sort_by_key(|blob| blob.id);

        if blobs.len() >= self.result_cap {
            tracing::warn!(cap = self.result_cap, "search results truncated at result cap");
        }
        Ok(blobs)
    }
}
