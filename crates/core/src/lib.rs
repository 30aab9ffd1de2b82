//! Core domain types and shared logic for Lakeside.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Tags and tag sets
//! - Blob identifiers, staged metadata and search results
//! - Processed payloads handed over at finalization
//! - Tenant deployment descriptors and credentials
//! - Configuration

pub mod blob;
pub mod config;
pub mod deployment;
pub mod error;
pub mod tag;

pub use blob::{Blob, BlobCreate, BlobId, BlobMetadata, ProcessedPayload};
pub use deployment::{Credentials, DeploymentDescriptor, DeploymentType};
pub use error::{Error, Result};
pub use tag::Tag;

/// Default content type for blobs created without one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// System tag name carrying the declared payload length.
pub const CONTENT_LENGTH_TAG: &str = "content-length";
