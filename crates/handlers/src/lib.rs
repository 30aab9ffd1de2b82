//! Backend handlers for Lakeside.
//!
//! One [`BlobHandler`] per deployment type writes finalized blobs to its
//! backends and answers tag queries through a variant-specific translator:
//!
//! - `AWS_1`: S3 payloads, OpenSearch index ([`opensearch`])
//! - `AWS_2`: S3 payloads, DynamoDB table ([`dynamodb`])
//! - `GCP_1`: BigQuery table ([`bigquery`])
//! - `AZURE_1`: Cosmos DB containers ([`cosmos`])
//!
//! Handlers are resolved through the [`HandlerRegistry`]. Backend clients are
//! built per request by [`Connect`] implementations from the tenant's
//! deployment descriptor; [`memory::MemoryConnector`] provides in-process
//! backends for all four.

pub mod aws;
pub mod bigquery;
pub mod client;
pub mod connect;
pub mod cosmos;
pub mod dynamodb;
pub mod error;
pub mod handler;
pub mod memory;
pub mod opensearch;
pub mod query;
pub mod registry;

pub use connect::Connect;
pub use error::{BackendOperation, HandlerError, HandlerResult, TranslationError};
pub use handler::{BlobHandler, HandlerContext};
pub use memory::MemoryConnector;
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
