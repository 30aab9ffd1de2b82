//! Telemetry collaborators for the orchestrator.
//!
//! The orchestrator reports every create, finalize and search outcome to a
//! [`Telemetry`] implementation chosen by [`TelemetryConfig`]:
//! - [`NoopTelemetry`] discards everything
//! - [`LogTelemetry`] emits structured `tracing` events
//! - [`PrometheusTelemetry`] records counters and durations in its own registry

use crate::error::{IngestError, IngestResult};
use lakeside_core::config::TelemetryConfig;
use lakeside_core::{BlobId, DeploymentType};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Finalize,
    Search,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Finalize => "finalize",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives ingestion events.
pub trait Telemetry: Send + Sync {
    fn blob_created(&self, deploy_type: DeploymentType, id: BlobId, elapsed: Duration);

    fn blob_finalized(&self, deploy_type: DeploymentType, id: BlobId, size: u64, elapsed: Duration);

    fn search_completed(
        &self,
        deploy_type: DeploymentType,
        tags: usize,
        results: usize,
        elapsed: Duration,
    );

    fn operation_failed(&self, deploy_type: DeploymentType, operation: Operation, error: &IngestError);

    /// Text exposition of collected metrics, for sinks that keep any.
    fn render(&self) -> Option<String> {
        None
    }
}

/// Telemetry that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn blob_created(&self, _: DeploymentType, _: BlobId, _: Duration) {}

    fn blob_finalized(&self, _: DeploymentType, _: BlobId, _: u64, _: Duration) {}

    fn search_completed(&self, _: DeploymentType, _: usize, _: usize, _: Duration) {}

    fn operation_failed(&self, _: DeploymentType, _: Operation, _: &IngestError) {}
}

/// Telemetry emitted as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn blob_created(&self, deploy_type: DeploymentType, id: BlobId, elapsed: Duration) {
        tracing::info!(
            deploy_type = %deploy_type,
            blob_id = %id,
            elapsed_ms = elapsed.as_millis() as u64,
            "blob created"
        );
    }

    fn blob_finalized(&self, deploy_type: DeploymentType, id: BlobId, size: u64, elapsed: Duration) {
        tracing::info!(
            deploy_type = %deploy_type,
            blob_id = %id,
            size,
            elapsed_ms = elapsed.as_millis() as u64,
            "blob finalized"
        );
    }

    fn search_completed(
        &self,
        deploy_type: DeploymentType,
        tags: usize,
        results: usize,
        elapsed: Duration,
    ) {
        tracing::info!(
            deploy_type = %deploy_type,
            tags,
            results,
            elapsed_ms = elapsed.as_millis() as u64,
            "search completed"
        );
    }

    fn operation_failed(&self, deploy_type: DeploymentType, operation: Operation, error: &IngestError) {
        tracing::warn!(
            deploy_type = %deploy_type,
            operation = %operation,
            kind = error.kind(),
            error = %error,
            "ingest operation failed"
        );
    }
}

/// Telemetry recorded as Prometheus metrics in an instance-owned registry.
pub struct PrometheusTelemetry {
    registry: Registry,
    blobs_created: IntCounterVec,
    blobs_finalized: IntCounterVec,
    bytes_finalized: IntCounterVec,
    searches: IntCounterVec,
    failures: IntCounterVec,
    duration: HistogramVec,
}

impl PrometheusTelemetry {
    /// Create and register all metrics, prefixed with `namespace`.
    pub fn new(namespace: &str) -> IngestResult<Self> {
        let counter = |name: &str, help: &str, labels: &[&str]| {
            IntCounterVec::new(Opts::new(name, help).namespace(namespace), labels)
        };

        let blobs_created = counter(
            "blobs_created_total",
            "Total number of blobs staged",
            &["deploy_type"],
        )?;
        let blobs_finalized = counter(
            "blobs_finalized_total",
            "Total number of blobs finalized",
            &["deploy_type"],
        )?;
        let bytes_finalized = counter(
            "bytes_finalized_total",
            "Total payload bytes written by finalize",
            &["deploy_type"],
        )?;
        let searches = counter(
            "searches_total",
            "Total number of tag searches",
            &["deploy_type"],
        )?;
        let failures = counter(
            "operation_failures_total",
            "Failed operations by deployment type, operation and error kind",
            &["deploy_type", "operation", "kind"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Duration of successful operations",
            )
            .namespace(namespace)
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["deploy_type", "operation"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(blobs_created.clone()))?;
        registry.register(Box::new(blobs_finalized.clone()))?;
        registry.register(Box::new(bytes_finalized.clone()))?;
        registry.register(Box::new(searches.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            blobs_created,
            blobs_finalized,
            bytes_finalized,
            searches,
            failures,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode(&self) -> IngestResult<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }

    fn observe(&self, deploy_type: DeploymentType, operation: Operation, elapsed: Duration) {
        self.duration
            .with_label_values(&[deploy_type.as_str(), operation.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

impl Telemetry for PrometheusTelemetry {
    fn blob_created(&self, deploy_type: DeploymentType, _id: BlobId, elapsed: Duration) {
        self.blobs_created
            .with_label_values(&[deploy_type.as_str()])
            .inc();
        self.observe(deploy_type, Operation::Create, elapsed);
    }

    fn blob_finalized(&self, deploy_type: DeploymentType, _id: BlobId, size: u64, elapsed: Duration) {
        self.blobs_finalized
            .with_label_values(&[deploy_type.as_str()])
            .inc();
        self.bytes_finalized
            .with_label_values(&[deploy_type.as_str()])
            .inc_by(size);
        self.observe(deploy_type, Operation::Finalize, elapsed);
    }

    fn search_completed(
        &self,
        deploy_type: DeploymentType,
        _tags: usize,
        _results: usize,
        elapsed: Duration,
    ) {
        self.searches.with_label_values(&[deploy_type.as_str()]).inc();
        self.observe(deploy_type, Operation::Search, elapsed);
    }

    fn operation_failed(&self, deploy_type: DeploymentType, operation: Operation, error: &IngestError) {
        self.failures
            .with_label_values(&[deploy_type.as_str(), operation.as_str(), error.kind()])
            .inc();
    }

    fn render(&self) -> Option<String> {
        match self.encode() {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode metrics");
                None
            }
        }
    }
}

/// Build the telemetry sink selected by configuration.
pub fn from_config(config: &TelemetryConfig) -> IngestResult<Arc<dyn Telemetry>> {
    match config {
        TelemetryConfig::None => Ok(Arc::new(NoopTelemetry)),
        TelemetryConfig::Log => Ok(Arc::new(LogTelemetry)),
        TelemetryConfig::Prometheus { namespace } => {
            Ok(Arc::new(PrometheusTelemetry::new(namespace)?))
        }
    }
}
