//! Object store endpoints the client talks to.
//!
//! [`ObjectBackend`] is the request/response surface of an S3-compatible
//! bucket: one method per remote call, each bound to a single bucket chosen
//! when the backend is built. [`S3Backend`] speaks to a real endpoint,
//! [`MemoryBackend`] keeps objects in process.

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::fs::File;

use crate::object::{ObjectInfo, UploadOptions};

mod backend_error;
#[cfg(test)]
mod faulty_backend;
mod memory_backend;
mod s3_backend;

pub use backend_error::{BackendError, BackendErrorKind};
#[cfg(test)]
pub(crate) use faulty_backend::FaultyBackend;
pub use memory_backend::{MemoryBackend, MemoryObject};
pub use s3_backend::{PART_SIZE, S3Backend};

/// Stream of object body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Stream of listed objects.
pub type ListStream = BoxStream<'static, Result<ObjectInfo, BackendError>>;

/// Result of a successful put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutput {
    /// Entity tag of the new object, if the backend provides one.
    pub etag: Option<String>,
    /// Version of the new object, if the backend provides one.
    pub version: Option<String>,
}

/// A single bucket of an S3-compatible object store.
///
/// Implementations must be safe to call concurrently; the client holds no
/// state of its own between calls.
#[async_trait::async_trait]
pub trait ObjectBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Returns whether the bound bucket exists.
    async fn bucket_exists(&self) -> Result<bool, BackendError>;

    /// Fetches object metadata without the body.
    async fn head(&self, key: &str) -> Result<ObjectInfo, BackendError>;

    /// Stores `body` under `key` with an exact content length.
    ///
    /// Replaces any existing object.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError>;

    /// Streams `len` bytes of `file` from its current position under `key`.
    ///
    /// The body is never held in memory as a whole.
    async fn put_file(
        &self,
        key: &str,
        file: File,
        len: u64,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError>;

    /// Stores a body of unknown length under `key`.
    ///
    /// Either the complete body becomes visible or nothing does.
    async fn put_stream(
        &self,
        key: &str,
        body: BodyStream,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError>;

    /// Opens a read stream over the body of `key`.
    async fn get(&self, key: &str) -> Result<BodyStream, BackendError>;

    /// Lists every object whose key starts with `prefix`, without delimiter grouping.
    fn list(&self, prefix: &str) -> ListStream;

    /// Deletes `key`. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}
