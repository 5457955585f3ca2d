//! In-process bucket backend.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use jiff::Timestamp;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::{BackendError, BodyStream, ListStream, ObjectBackend, PutOutput};
use crate::fs::sha256_hex;
use crate::object::{ObjectInfo, UploadOptions, Visibility};

/// An object held by [`MemoryBackend`], including the metadata it was uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    /// Object body.
    pub data: Bytes,
    /// Content type sent with the upload.
    pub content_type: Option<String>,
    /// Visibility sent with the upload.
    pub visibility: Visibility,
    /// Time the object was stored.
    pub last_modified: Timestamp,
    /// Quoted entity tag derived from the body.
    pub etag: String,
}

impl MemoryObject {
    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
        }
    }
}

/// Bucket backend that keeps objects in memory.
///
/// Cloning shares the same objects. Keys are kept sorted, so listings are
/// lexicographic like most S3-compatible stores.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, MemoryObject>>>,
    bucket_exists: bool,
}

impl MemoryBackend {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self {
            objects: Arc::default(),
            bucket_exists: true,
        }
    }

    /// Creates a backend whose bucket does not exist.
    pub fn without_bucket() -> Self {
        Self {
            objects: Arc::default(),
            bucket_exists: false,
        }
    }

    /// Returns a copy of the object stored under `key`.
    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.read().ok()?.get(key).cloned()
    }

    /// Returns all stored keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.read().map(|objects| objects.len()).unwrap_or_default()
    }

    /// Returns whether the bucket holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, MemoryObject>>, BackendError> {
        self.objects
            .read()
            .map_err(|_| BackendError::other("memory backend lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, MemoryObject>>, BackendError> {
        self.objects
            .write()
            .map_err(|_| BackendError::other("memory backend lock poisoned"))
    }

    fn store(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<PutOutput, BackendError> {
        let etag = format!("\"{}\"", &sha256_hex(&data)[..32]);
        let object = MemoryObject {
            data,
            content_type: options.content_type.map(str::to_string),
            visibility: options.visibility,
            last_modified: Timestamp::now(),
            etag: etag.clone(),
        };

        self.write()?.insert(key.to_string(), object);

        Ok(PutOutput {
            etag: Some(etag),
            version: None,
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectBackend for MemoryBackend {
    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        Ok(self.bucket_exists)
    }

    async fn head(&self, key: &str) -> Result<ObjectInfo, BackendError> {
        self.read()?
            .get(key)
            .map(|object| object.info(key))
            .ok_or_else(|| BackendError::not_found(key))
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        self.store(key, body, options)
    }

    async fn put_file(
        &self,
        key: &str,
        file: File,
        len: u64,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        let mut data = Vec::new();
        file.take(len).read_to_end(&mut data).await?;
        if (data.len() as u64) < len {
            return Err(BackendError::other(format!(
                "body of '{key}' ended after {} of {len} bytes",
                data.len()
            )));
        }

        self.store(key, data.into(), options)
    }

    async fn put_stream(
        &self,
        key: &str,
        mut body: BodyStream,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        self.store(key, buffer.freeze(), options)
    }

    async fn get(&self, key: &str) -> Result<BodyStream, BackendError> {
        let data = self
            .read()?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| BackendError::not_found(key))?;

        Ok(stream::iter([Ok(data)]).boxed())
    }

    fn list(&self, prefix: &str) -> ListStream {
        let snapshot: Result<Vec<ObjectInfo>, BackendError> = self.read().map(|objects| {
            objects
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, object)| object.info(key))
                .collect()
        });

        match snapshot {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
            Err(err) => stream::iter([Err(err)]).boxed(),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.write()?.remove(key);
        Ok(())
    }
}
