//! The backend handler trait.

use crate::error::HandlerResult;
use async_trait::async_trait;
use lakeside_core::{
    Blob, BlobCreate, BlobId, BlobMetadata, DeploymentDescriptor, DeploymentType,
    ProcessedPayload, Tag,
};
use lakeside_staging::StagingStore;

/// Per-request context handed to a handler.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Tenant deployment the request targets.
    pub deployment: &'a DeploymentDescriptor,
    /// Staging store for handlers that stage externally.
    pub staging: &'a dyn StagingStore,
}

impl<'a> HandlerContext<'a> {
    pub fn new(deployment: &'a DeploymentDescriptor, staging: &'a dyn StagingStore) -> Self {
        Self {
            deployment,
            staging,
        }
    }
}

/// Storage and search for one deployment type.
///
/// Implementations write the payload and the searchable record on
/// [`finalize`](BlobHandler::finalize) and answer tag queries on
/// [`search`](BlobHandler::search). Both writes are keyed by blob id and
/// overwrite, so a failed finalize can be retried.
#[async_trait]
pub trait BlobHandler: Send + Sync {
    /// Deployment type served by this handler.
    fn deployment_type(&self) -> DeploymentType;

    /// Allocate an id and write the initial record.
    ///
    /// The default stages the record in the staging store.
    async fn insert(&self, ctx: &HandlerContext<'_>, create: &BlobCreate) -> HandlerResult<BlobId> {
        let metadata = BlobMetadata::staged(BlobId::new(), create.clone());
        let id = ctx.staging.create(&metadata).await?;
        tracing::debug!(blob_id = %id, deploy_type = %self.deployment_type(), "blob staged");
        Ok(id)
    }

    /// Write the payload and the finalized searchable record.
    ///
    /// Never touches the staging record.
    async fn finalize(
        &self,
        ctx: &HandlerContext<'_>,
        staged: &BlobMetadata,
        payload: &ProcessedPayload,
    ) -> HandlerResult<()>;

    /// Return every finalized blob carrying all requested tags, in either tag
    /// category, ordered by id.
    async fn search(&self, ctx: &HandlerContext<'_>, tags: &[Tag]) -> HandlerResult<Vec<Blob>>;
}
