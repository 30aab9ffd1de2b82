//! The two-phase ingestion protocol: create, finalize, search.

use crate::error::IngestResult;
use crate::telemetry::{NoopTelemetry, Operation, Telemetry};
use lakeside_core::{Blob, BlobCreate, BlobId, DeploymentDescriptor, ProcessedPayload, Tag};
use lakeside_handlers::{HandlerContext, HandlerRegistry};
use lakeside_staging::StagingStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Coordinates the staging store and the backend handlers.
///
/// A blob is staged by [`create`](Orchestrator::create), written to its
/// backends by [`finalize`](Orchestrator::finalize) and only then removed
/// from staging. Any finalize failure leaves the staged record in place so
/// the call can be retried; handler writes overwrite by id, which makes the
/// retry safe.
pub struct Orchestrator {
    staging: Arc<dyn StagingStore>,
    registry: HandlerRegistry,
    telemetry: Arc<dyn Telemetry>,
}

impl Orchestrator {
    pub fn new(staging: Arc<dyn StagingStore>, registry: HandlerRegistry) -> Self {
        Self {
            staging,
            registry,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn staging(&self) -> &Arc<dyn StagingStore> {
        &self.staging
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn telemetry(&self) -> &Arc<dyn Telemetry> {
        &self.telemetry
    }

    /// Stage a new blob and return its id.
    #[instrument(skip_all, fields(project_id = %deployment.project_id, deploy_type = %deployment.deploy_type))]
    pub async fn create(
        &self,
        deployment: &DeploymentDescriptor,
        create: &BlobCreate,
    ) -> IngestResult<BlobId> {
        let started = Instant::now();
        let result = self.try_create(deployment, create).await;

        match &result {
            Ok(id) => self
                .telemetry
                .blob_created(deployment.deploy_type, *id, started.elapsed()),
            Err(e) => self
                .telemetry
                .operation_failed(deployment.deploy_type, Operation::Create, e),
        }
        result
    }

    async fn try_create(
        &self,
        deployment: &DeploymentDescriptor,
        create: &BlobCreate,
    ) -> IngestResult<BlobId> {
        deployment.validate()?;
        let handler = self.registry.resolve(deployment.deploy_type)?;
        let ctx = HandlerContext::new(deployment, self.staging.as_ref());
        Ok(handler.insert(&ctx, create).await?)
    }

    /// Write the payload and searchable record of a staged blob, then retire
    /// the staged record.
    #[instrument(skip_all, fields(project_id = %deployment.project_id, deploy_type = %deployment.deploy_type, blob_id = %id))]
    pub async fn finalize(
        &self,
        deployment: &DeploymentDescriptor,
        id: BlobId,
        payload: &ProcessedPayload,
    ) -> IngestResult<()> {
        let started = Instant::now();
        let result = self.try_finalize(deployment, id, payload).await;

        match &result {
            Ok(()) => self.telemetry.blob_finalized(
                deployment.deploy_type,
                id,
                payload.len(),
                started.elapsed(),
            ),
            Err(e) => self
                .telemetry
                .operation_failed(deployment.deploy_type, Operation::Finalize, e),
        }
        result
    }

    async fn try_finalize(
        &self,
        deployment: &DeploymentDescriptor,
        id: BlobId,
        payload: &ProcessedPayload,
    ) -> IngestResult<()> {
        deployment.validate()?;
        let staged = self.staging.get(id).await?;
        let handler = self.registry.resolve(deployment.deploy_type)?;
        let ctx = HandlerContext::new(deployment, self.staging.as_ref());

        handler.finalize(&ctx, &staged, payload).await?;

        if let Err(e) = self.staging.delete(id).await {
            // The backends hold the blob; a retry rewrites the same record.
            tracing::error!(blob_id = %id, error = %e, "finalized blob is still staged");
            return Err(e.into());
        }

        tracing::debug!(blob_id = %id, size = payload.len(), "blob finalized");
        Ok(())
    }

    /// Return every finalized blob carrying all `tags`, ordered by id.
    #[instrument(skip_all, fields(project_id = %deployment.project_id, deploy_type = %deployment.deploy_type, tags = tags.len()))]
    pub async fn search(
        &self,
        deployment: &DeploymentDescriptor,
        tags: &[Tag],
    ) -> IngestResult<Vec<Blob>> {
        let started = Instant::now();
        let result = self.try_search(deployment, tags).await;

        match &result {
            Ok(blobs) => self.telemetry.search_completed(
                deployment.deploy_type,
                tags.len(),
                blobs.len(),
                started.elapsed(),
            ),
            Err(e) => self
                .telemetry
                .operation_failed(deployment.deploy_type, Operation::Search, e),
        }
        result
    }

    async fn try_search(
        &self,
        deployment: &DeploymentDescriptor,
        tags: &[Tag],
    ) -> IngestResult<Vec<Blob>> {
        deployment.validate()?;
        let handler = self.registry.resolve(deployment.deploy_type)?;
        let ctx = HandlerContext::new(deployment, self.staging.as_ref());
        Ok(handler.search(&ctx, tags).await?)
    }

    /// Check the staging store.
    pub async fn health_check(&self) -> IngestResult<()> {
        self.staging.health_check().await?;
        Ok(())
    }
}
