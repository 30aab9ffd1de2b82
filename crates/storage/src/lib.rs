//! Object storage abstraction and backends for Lakeside.
//!
//! Payloads are stored whole under their blob id. Backends:
//! - S3 (per-tenant bucket and credentials)
//! - Local filesystem with atomic writes
//! - In-memory, for tests and local development

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{
    filesystem::FilesystemBackend,
    memory::MemoryBackend,
    s3::{S3Backend, S3Credentials, S3Settings},
};
pub use error::{StorageError, StorageResult};
pub use traits::{ObjectMeta, ObjectStore};
