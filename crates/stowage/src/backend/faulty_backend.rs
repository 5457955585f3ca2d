//! Fault injection over [`MemoryBackend`] for client tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::{StreamExt, stream};
use tokio::fs::File;

use super::{BackendError, BodyStream, ListStream, MemoryBackend, ObjectBackend, PutOutput};
use crate::object::{ObjectInfo, UploadOptions};

#[derive(Debug, Default)]
pub(crate) struct FaultyBackend {
    inner: MemoryBackend,
    fail_put_key: Option<String>,
    cut_get: bool,
    fail_list_after: Option<usize>,
    fail_head: bool,
    fail_bucket_check: bool,
    put_attempts: Arc<AtomicUsize>,
}

impl FaultyBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fails every put of `key`.
    pub fn fail_put(mut self, key: &str) -> Self {
        self.fail_put_key = Some(key.to_string());
        self
    }

    /// Ends every GET body with an error after its first chunk.
    pub fn cut_get(mut self) -> Self {
        self.cut_get = true;
        self
    }

    /// Fails listings after `count` items.
    pub fn fail_list_after(mut self, count: usize) -> Self {
        self.fail_list_after = Some(count);
        self
    }

    pub fn fail_head(mut self) -> Self {
        self.fail_head = true;
        self
    }

    pub fn fail_bucket_check(mut self) -> Self {
        self.fail_bucket_check = true;
        self
    }

    /// Counter of put attempts, shared with the backend.
    pub fn put_attempts(&self) -> Arc<AtomicUsize> {
        self.put_attempts.clone()
    }

    fn check_put(&self, key: &str) -> Result<(), BackendError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put_key.as_deref() == Some(key) {
            return Err(BackendError::other("injected put failure"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectBackend for FaultyBackend {
    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        if self.fail_bucket_check {
            return Err(BackendError::other("injected connection failure"));
        }
        self.inner.bucket_exists().await
    }

    async fn head(&self, key: &str) -> Result<ObjectInfo, BackendError> {
        if self.fail_head {
            return Err(BackendError::other("injected head failure"));
        }
        self.inner.head(key).await
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        self.check_put(key)?;
        self.inner.put(key, body, options).await
    }

    async fn put_file(
        &self,
        key: &str,
        file: File,
        len: u64,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        self.check_put(key)?;
        self.inner.put_file(key, file, len, options).await
    }

    async fn put_stream(
        &self,
        key: &str,
        body: BodyStream,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        self.check_put(key)?;
        self.inner.put_stream(key, body, options).await
    }

    async fn get(&self, key: &str) -> Result<BodyStream, BackendError> {
        let body = self.inner.get(key).await?;
        if !self.cut_get {
            return Ok(body);
        }

        let cut = stream::iter([Err(BackendError::other("injected connection reset"))]);
        Ok(body.take(1).chain(cut).boxed())
    }

    fn list(&self, prefix: &str) -> ListStream {
        let listing = self.inner.list(prefix);
        match self.fail_list_after {
            Some(count) => {
                let broken = stream::iter([Err(BackendError::other("injected listing failure"))]);
                listing.take(count).chain(broken).boxed()
            }
            None => listing,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.inner.delete(key).await
    }
}
