//! Deployment `GCP_1`: payload and metadata in one append-only BigQuery table.

pub mod client;
pub mod query;

use crate::client::{ClientError, ClientResult, http_client};
use crate::connect::Connect;
use crate::error::{BackendOperation, HandlerError, HandlerResult};
use crate::handler::{BlobHandler, HandlerContext};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lakeside_core::{
    Blob, BlobId, BlobMetadata, Credentials, DeploymentDescriptor, DeploymentType,
    ProcessedPayload, Tag,
};
use query::{TableRef, WarehouseQuery};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::instrument;

pub use client::BigQueryClient;

const VARIANT: DeploymentType = DeploymentType::Gcp1;

/// One row of the blob table. Every finalize appends a row; readers keep the
/// latest row per id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRow {
    pub id: String,
    pub name: String,
    pub content_type: String,
    /// RFC 3339.
    pub timestamp: String,
    pub source: String,
    pub user_tags: Vec<Tag>,
    pub system_tags: Vec<Tag>,
    pub size: u64,
    /// Base64 payload.
    pub file: String,
    /// Append time with a fixed microsecond fraction, used to pick the
    /// latest row.
    pub ingested_at: String,
}

impl WarehouseRow {
    pub fn new(meta: &BlobMetadata, payload: &ProcessedPayload) -> ClientResult<Self> {
        let format = |t: OffsetDateTime| {
            t.format(&Rfc3339)
                .map_err(|e| ClientError::Rejected(format!("timestamp: {e}")))
        };

        Ok(Self {
            id: meta.id.to_string(),
            name: meta.name.clone(),
            content_type: meta.content_type.clone(),
            timestamp: format(meta.timestamp)?,
            source: meta.source.clone(),
            user_tags: meta.user_tags.clone(),
            system_tags: meta.system_tags.clone(),
            size: meta.size,
            file: STANDARD.encode(&payload.data),
            ingested_at: OffsetDateTime::now_utc()
                .format(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                ))
                .map_err(|e| ClientError::Rejected(format!("ingested_at: {e}")))?,
        })
    }

    pub fn to_blob(&self) -> ClientResult<Blob> {
        Ok(Blob {
            id: BlobId::parse(&self.id).map_err(|e| ClientError::Decode(e.to_string()))?,
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            timestamp: OffsetDateTime::parse(&self.timestamp, &Rfc3339)
                .map_err(|e| ClientError::Decode(format!("timestamp: {e}")))?,
            source: self.source.clone(),
            user_tags: self.user_tags.clone(),
            system_tags: self.system_tags.clone(),
            size: self.size,
        })
    }
}

/// An append-only analytical table.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Table the queries should target.
    fn table(&self) -> &TableRef;

    /// Create the table with `schema` unless it already exists. An existing
    /// table keeps its schema.
    async fn ensure_table(&self, schema: &serde_json::Value) -> ClientResult<()>;

    /// Append a row.
    async fn insert_row(&self, row: &WarehouseRow) -> ClientResult<()>;

    /// Run a search query.
    async fn query(&self, query: &WarehouseQuery) -> ClientResult<Vec<Blob>>;

    async fn health_check(&self) -> ClientResult<()>;
}

/// Resource payload of a `GCP_1` deployment.
#[derive(Clone, Debug, Deserialize)]
pub struct WarehouseResources {
    pub bigquery: BigQueryResource,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BigQueryResource {
    pub project: String,
    pub dataset: String,
    pub table: String,
    /// Dataset location, e.g. `EU`.
    #[serde(default)]
    pub location: Option<String>,
}

impl BigQueryResource {
    pub fn table_ref(&self) -> TableRef {
        TableRef {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: self.table.clone(),
        }
    }
}

/// Builds BigQuery clients from tenant credentials.
pub struct BigQueryConnector {
    http: reqwest::Client,
}

impl BigQueryConnector {
    pub fn new(http_timeout: Duration) -> HandlerResult<Self> {
        let http = http_client(http_timeout)
            .map_err(|e| HandlerError::InvalidDeployment(format!("HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Connect<Arc<dyn Warehouse>> for BigQueryConnector {
    async fn connect(&self, deployment: &DeploymentDescriptor) -> HandlerResult<Arc<dyn Warehouse>> {
        let resources: WarehouseResources = deployment.resources()?;
        let Credentials::Gcp { access_token, .. } = &deployment.credentials else {
            return Err(HandlerError::InvalidDeployment(format!(
                "{} requires gcp credentials, got {}",
                deployment.deploy_type,
                deployment.credentials.provider()
            )));
        };

        let client = BigQueryClient::new(
            self.http.clone(),
            resources.bigquery.table_ref(),
            resources.bigquery.location.clone(),
            access_token,
        )
        .map_err(|e| HandlerError::InvalidDeployment(e.to_string()))?;

        Ok(Arc::new(client))
    }
}

/// Handler storing each blob as a BigQuery row.
pub struct WarehouseHandler {
    connector: Arc<dyn Connect<Arc<dyn Warehouse>>>,
}

impl WarehouseHandler {
    pub fn new(connector: Arc<dyn Connect<Arc<dyn Warehouse>>>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl BlobHandler for WarehouseHandler {
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
        let warehouse = self.connector.connect(ctx.deployment).await?;
        let finalized = staged.finalize_with(payload);

        let row = WarehouseRow::new(&finalized, payload)
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;
        warehouse
            .ensure_table(&query::table_schema())
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;
        warehouse
            .insert_row(&row)
            .await
            .map_err(|e| HandlerError::write(VARIANT, BackendOperation::IndexWrite, e))?;

        Ok(())
    }

    #[instrument(skip_all, fields(deploy_type = %VARIANT, tags = tags.len()))]
    async fn search(&self, ctx: &HandlerContext<'_>, tags: &[Tag]) -> HandlerResult<Vec<Blob>> {
        let warehouse = self.connector.connect(ctx.deployment).await?;
        let query = query::translate(warehouse.table(), tags)?;

        warehouse
            .ensure_table(&query::table_schema())
            .await
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;
        let mut blobs = warehouse
            .query(&query)
            .await
            .map_err(|e| HandlerError::read(VARIANT, BackendOperation::IndexQuery, e))?;
        blobs.sort_by_key(|blob| blob.id);
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeside_core::BlobCreate;
    use time::macros::datetime;

    #[test]
    fn test_row_roundtrip() {
        let create = BlobCreate {
            timestamp: datetime!(2024-05-01 08:00:00 UTC),
            ..BlobCreate::new("reading")
        }
        .with_user_tags(vec![Tag::new("env", "prod")]);
        let payload = ProcessedPayload::new(&b"hi"[..], vec![Tag::bare("binary")]);
        let meta = BlobMetadata::staged(BlobId::new(), create).finalize_with(&payload);

        let row = WarehouseRow::new(&meta, &payload).unwrap();
        assert_eq!(row.file, "aGk=");
        assert_eq!(row.timestamp, "2024-05-01T08:00:00Z");
        assert_eq!(row.to_blob().unwrap(), Blob::from(meta));

        // Fixed width, so a whole second never sorts after a fraction of it.
        assert_eq!(row.ingested_at.len(), "2024-05-01T08:00:00.000000Z".len());
        OffsetDateTime::parse(&row.ingested_at, &Rfc3339).unwrap();
    }
}
