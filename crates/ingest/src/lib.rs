//! Ingestion orchestrator for Lakeside.
//!
//! Drives the two-phase blob protocol over a staging store and the handler
//! registry:
//! 1. `create` stages metadata and returns an id
//! 2. `finalize` writes payload and searchable record, then retires the
//!    staged record
//! 3. `search` answers tag queries

pub mod bootstrap;
pub mod error;
pub mod orchestrator;
pub mod telemetry;

pub use error::{IngestError, IngestResult};
pub use orchestrator::Orchestrator;
pub use telemetry::{LogTelemetry, NoopTelemetry, Operation, PrometheusTelemetry, Telemetry};
