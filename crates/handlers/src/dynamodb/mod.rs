//! Deployment `AWS_2`: S3 payloads with a DynamoDB table.

pub mod client;
pub mod item;
pub mod query;

use crate::aws::BucketResource;
use crate::client::ClientResult;
use crate::connect::Connect;
use crate::error::{BackendOperation, HandlerError, HandlerResult};
use crate::handler::{BlobHandler, HandlerContext};
use async_trait::async_trait;
use item::Item;
use lakeside_core::{Blob, BlobMetadata, DeploymentType, ProcessedPayload, Tag};
use lakeside_storage::ObjectStore;
use query::ScanFilter;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

pub use client::DynamoTable;

const VARIANT: DeploymentType = DeploymentType::Aws2;

/// A key/attribute table keyed by blob id.
#[async_trait]
pub trait AttributeTable: Send + Sync {
    /// Create or replace the item with the same id.
    async fn put_item(&self, item: Item) -> ClientResult<()>;

    /// Scan the whole table, keeping items that pass `filter`.
    async fn scan(&self, filter: Option<&ScanFilter>) -> ClientResult<Vec<Item>>;

    async fn health_check(&self) -> ClientResult<()>;
}

/// Clients for one `AWS_2` deployment.
#[derive(Clone)]
pub struct KeyAttributeBackends {
    pub objects: Arc<dyn ObjectStore>,
    pub table: Arc<dyn AttributeTable>,
}

/// Resource payload of an `AWS_2` deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct KeyAttributeResources {
    pub s3: BucketResource,
    pub dynamodb: TableResource,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TableResource {
    pub table_name: String,
    /// Custom endpoint, e.g. DynamoDB Local.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Handler storing payloads in S3 and searchable records in DynamoDB.
pub struct KeyAttributeHandler {
    connector: Arc<dyn Connect<KeyAttributeBackends>>,
}

impl KeyAttributeHandler {
    pub fn new(connector: Arc<dyn Connect<KeyAttributeBackends>>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl BlobHandler for KeyAttributeHandler {
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

        backends
            .objects
            .put(
                &finalized.id.to_string(),
                payload.data.clone(),
                Some(&finalized.content_type),
            )
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::ObjectPut, e))?;

        let item = item::to_item(&finalized)
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;
        backends
            .table
            .put_item(item)
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;

        Ok(())
    }

    #[instrument(skip_all, fields(deploy_type = %VARIANT, tags = tags.len()))]
    async fn search(&self, ctx: &HandlerContext<'_>, tags: &[Tag]) -> HandlerResult<Vec<Blob>> {
        let filter = query::translate(tags)?;
        let backends = self.connector.connect(ctx.deployment).await?;

        let items = backends
            .table
            .scan(filter.as_ref())
            .await
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;

        let mut blobs = items
            .iter()
            .map(item::from_item)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;
        blobs.sort_by_key(|blob| blob.id);
        Ok(blobs)
    }
}
