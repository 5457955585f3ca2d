//! Bucket client.
//!
//! [`Client`] binds one [`ObjectBackend`] to one bucket and exposes the
//! object operations on top of it: existence checks, uploads (plain,
//! compressed, whole directories), atomic downloads, listing, removal and
//! public URL construction. Every remote operation takes a [`CallContext`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, instrument, warn};

use super::{CallContext, ObjectListing, StoreConfig};
use crate::backend::{BackendError, BackendErrorKind, ObjectBackend, PutOutput, S3Backend};
use crate::codec;
use crate::fs::{HashingReader, sha256_hex, write_atomic};
use crate::object::{
    DownloadInfo, ObjectInfo, ObjectUrl, Presence, UploadInfo, UploadOptions, Visibility,
};
use crate::{Error, Result, TRACING_TARGET_CLIENT, TRACING_TARGET_OBJECTS};

/// Client bound to a single bucket of an S3-compatible store.
///
/// Cheap to clone; clones share the backend. Safe to use from many tasks at
/// once since it holds no mutable state.
#[derive(Debug, Clone)]
pub struct Client {
    backend: Arc<dyn ObjectBackend>,
    bucket: String,
    url: ObjectUrl,
}

impl Client {
    /// Connects to the store described by `config`.
    ///
    /// Validates the configuration, then checks that the bucket exists. No
    /// request is made when validation fails.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid configuration,
    /// [`Error::BucketNotFound`] when the bucket does not exist and
    /// [`Error::Connection`] when the check itself fails.
    #[instrument(skip_all, target = TRACING_TARGET_CLIENT, fields(bucket = %config.bucket, endpoint = %config.endpoint))]
    pub async fn connect(config: &StoreConfig, ctx: &CallContext) -> Result<Self> {
        config.validate()?;
        let backend = S3Backend::new(config);
        Self::with_backend(config, backend, ctx).await
    }

    /// Builds a client over an existing backend.
    ///
    /// Performs the same validation and bucket check as [`Client::connect`].
    pub async fn with_backend(
        config: &StoreConfig,
        backend: impl ObjectBackend,
        ctx: &CallContext,
    ) -> Result<Self> {
        config.validate()?;
        let url = ObjectUrl::new(&config.bucket, &config.endpoint)?;
        let backend: Arc<dyn ObjectBackend> = Arc::new(backend);

        debug!(
            target: TRACING_TARGET_CLIENT,
            bucket = %config.bucket,
            access_key = %config.access_key_masked(),
            "Checking bucket"
        );

        let exists = ctx
            .run(async { backend.bucket_exists().await.map_err(Error::connection) })
            .await
            .inspect_err(|e| {
                error!(
                    target: TRACING_TARGET_CLIENT,
                    bucket = %config.bucket,
                    error = %e,
                    "Bucket check failed"
                );
            })?;

        if !exists {
            error!(
                target: TRACING_TARGET_CLIENT,
                bucket = %config.bucket,
                "Bucket does not exist"
            );
            return Err(Error::bucket_not_found(&config.bucket));
        }

        info!(
            target: TRACING_TARGET_CLIENT,
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "Client connected"
        );

        Ok(Self {
            backend,
            bucket: config.bucket.clone(),
            url,
        })
    }

    /// Returns the bucket this client is bound to.
    #[inline]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the public base URL of the bucket, ending with `/`.
    #[inline]
    pub fn url_base(&self) -> &str {
        self.url.base()
    }

    /// Returns the public URL of `path`. The object does not need to exist.
    pub fn url_for_path(&self, path: &str) -> String {
        self.url.for_key(path)
    }

    /// Checks whether `key` exists, keeping failures apart from absence.
    #[instrument(skip(self, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, key = %key))]
    pub async fn probe(&self, key: &str, ctx: &CallContext) -> Presence {
        match self.stat(key, ctx).await {
            Ok(_) => Presence::Present,
            Err(Error::Stat { source, .. }) if source.kind() == BackendErrorKind::NotFound => {
                Presence::Absent
            }
            Err(err) => Presence::Unknown(err),
        }
    }

    /// Returns whether `key` exists.
    ///
    /// Any failure, including a network error, reads as `false`; use
    /// [`Client::probe`] to tell them apart.
    pub async fn exists(&self, key: &str, ctx: &CallContext) -> bool {
        match self.probe(key, ctx).await {
            Presence::Present => true,
            Presence::Absent => false,
            Presence::Unknown(err) => {
                debug!(
                    target: TRACING_TARGET_OBJECTS,
                    key = %key,
                    error = %err,
                    "Existence check failed, reporting absent"
                );
                false
            }
        }
    }

    /// Fetches the metadata of `key` without its body.
    pub async fn stat(&self, key: &str, ctx: &CallContext) -> Result<ObjectInfo> {
        ctx.run(async {
            self.backend
                .head(key)
                .await
                .map_err(|e| Error::stat(key, e))
        })
        .await
    }

    /// Uploads `data` under `key`, replacing any existing object.
    ///
    /// The content type is derived from the key and the body is sent with its
    /// exact length.
    #[instrument(skip(self, data, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, key = %key))]
    pub async fn upload_data(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        visibility: Visibility,
        ctx: &CallContext,
    ) -> Result<UploadInfo> {
        let data = data.into();
        let options = UploadOptions::for_key(key, visibility);
        let sha256 = sha256_hex(&data);
        let size = data.len() as u64;

        debug!(
            target: TRACING_TARGET_OBJECTS,
            key = %key,
            size,
            visibility = %visibility,
            "Uploading object"
        );

        let start = Instant::now();
        let result = ctx
            .run(async {
                self.backend
                    .put(key, data, &options)
                    .await
                    .map_err(|e| Error::upload(key, e))
            })
            .await;

        let output = self.log_upload(key, size, start, result)?;
        Ok(upload_info(key, size, output, &options, sha256))
    }

    /// Uploads the local file at `local` under `key`.
    ///
    /// The body is streamed from disk with the file's size at open time as
    /// its content length.
    #[instrument(skip(self, local, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, key = %key))]
    pub async fn upload_file(
        &self,
        local: impl AsRef<Path>,
        key: &str,
        visibility: Visibility,
        ctx: &CallContext,
    ) -> Result<UploadInfo> {
        ctx.check()?;
        let local = local.as_ref();
        let options = UploadOptions::for_key(key, visibility);

        let mut file = File::open(local).await?;
        let size = file.metadata().await?.len();
        let sha256 = file_digest(&mut file, size).await?;

        debug!(
            target: TRACING_TARGET_OBJECTS,
            key = %key,
            local = %local.display(),
            size,
            visibility = %visibility,
            "Uploading file"
        );

        let start = Instant::now();
        let result = ctx
            .run(async {
                self.backend
                    .put_file(key, file, size, &options)
                    .await
                    .map_err(|e| Error::upload(key, e))
            })
            .await;

        let output = self.log_upload(key, size, start, result)?;
        Ok(upload_info(key, size, output, &options, sha256))
    }

    /// Compresses `data` with brotli and uploads it publicly under `key`.
    ///
    /// The object keeps the content type of `key`; readers receive the
    /// compressed bytes.
    pub async fn upload_data_compressed(
        &self,
        key: &str,
        data: &[u8],
        ctx: &CallContext,
    ) -> Result<UploadInfo> {
        ctx.check()?;
        let compressed = codec::compress(data)?;
        self.upload_data(key, compressed, Visibility::Public, ctx)
            .await
    }

    /// Compresses the local file at `local` and uploads it publicly under `key`.
    ///
    /// Compression runs while the upload is in flight; neither the file nor
    /// the compressed body is held in memory as a whole. The returned size
    /// and digest describe the compressed bytes.
    #[instrument(skip(self, local, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, key = %key))]
    pub async fn upload_file_compressed(
        &self,
        local: impl AsRef<Path>,
        key: &str,
        ctx: &CallContext,
    ) -> Result<UploadInfo> {
        ctx.check()?;
        let file = File::open(local.as_ref()).await?;
        let options = UploadOptions::for_key(key, Visibility::Public);
        let (body, digest) = codec::compressed_body(file);

        debug!(
            target: TRACING_TARGET_OBJECTS,
            key = %key,
            local = %local.as_ref().display(),
            "Uploading compressed file"
        );

        let start = Instant::now();
        let result = ctx
            .run(async {
                self.backend
                    .put_stream(key, body, &options)
                    .await
                    .map_err(|e| Error::upload(key, e))
            })
            .await;

        // The digest is only sent once the backend has read the whole body.
        let result = match result {
            Ok(output) => digest.await.map(|digest| (output, digest)).map_err(|_| {
                Error::upload(key, BackendError::other("compressed body was not fully read"))
            }),
            Err(err) => Err(err),
        };

        let size = result.as_ref().map_or(0, |(_, digest)| digest.size);
        let (output, digest) = self.log_upload(key, size, start, result)?;
        Ok(upload_info(key, digest.size, output, &options, digest.sha256))
    }

    /// Uploads every regular file directly inside `local_dir` as a public object.
    ///
    /// Each file is stored as `<remote_prefix>/<file name>`, in file name
    /// order. Subdirectories are skipped. The first failure stops the upload;
    /// objects stored before it are left in place and listed in the error.
    #[instrument(skip(self, local_dir, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, prefix = %remote_prefix))]
    pub async fn upload_directory(
        &self,
        local_dir: impl AsRef<Path>,
        remote_prefix: &str,
        ctx: &CallContext,
    ) -> Result<Vec<UploadInfo>> {
        let files = regular_files(local_dir.as_ref(), remote_prefix).await?;
        let mut uploaded: Vec<UploadInfo> = Vec::with_capacity(files.len());

        for (remote, local) in files {
            let result = match ctx.check() {
                Ok(()) => {
                    self.upload_file(&local, &remote, Visibility::Public, ctx)
                        .await
                }
                Err(err) => Err(err),
            };

            match result {
                Ok(info) => uploaded.push(info),
                Err(err) => {
                    warn!(
                        target: TRACING_TARGET_OBJECTS,
                        local = %local.display(),
                        remote = %remote,
                        uploaded = uploaded.len(),
                        error = %err,
                        "Directory upload stopped"
                    );
                    return Err(Error::UploadDirectory {
                        local,
                        remote,
                        uploaded: uploaded.into_iter().map(|info| info.key).collect(),
                        source: Box::new(err),
                    });
                }
            }
        }

        info!(
            target: TRACING_TARGET_OBJECTS,
            prefix = %remote_prefix,
            count = uploaded.len(),
            "Directory uploaded"
        );

        Ok(uploaded)
    }

    /// Reads the whole body of `key` into memory.
    pub async fn download_bytes(&self, key: &str, ctx: &CallContext) -> Result<Bytes> {
        ctx.run(async {
            let body = self
                .backend
                .get(key)
                .await
                .map_err(|e| Error::download(key, e))?;

            let data = body
                .try_fold(BytesMut::new(), |mut data, chunk| async move {
                    data.extend_from_slice(&chunk);
                    Ok(data)
                })
                .await
                .map_err(|e| Error::download(key, e))?;

            Ok(data.freeze())
        })
        .await
    }

    /// Downloads `key` to the local file at `local`.
    ///
    /// Missing parent directories are created. The file is replaced
    /// atomically: after a failure or cancellation it holds exactly what it
    /// held before.
    #[instrument(skip(self, local, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, key = %key))]
    pub async fn download_to_file(
        &self,
        key: &str,
        local: impl AsRef<Path>,
        ctx: &CallContext,
    ) -> Result<DownloadInfo> {
        let local = local.as_ref();
        let start = Instant::now();

        let result = ctx
            .run(async {
                let body = self
                    .backend
                    .get(key)
                    .await
                    .map_err(|e| Error::download(key, e))?;

                if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }

                let mut reader = HashingReader::new(StreamReader::new(
                    body.map_err(std::io::Error::other),
                ));
                let size = write_atomic(local, &mut reader)
                    .await
                    .map_err(|e| download_error(key, e))?;

                Ok(DownloadInfo {
                    key: key.to_string(),
                    size,
                    sha256: reader.finalize_hex(),
                })
            })
            .await;

        match &result {
            Ok(info) => info!(
                target: TRACING_TARGET_OBJECTS,
                key = %key,
                local = %local.display(),
                size = info.size,
                elapsed = ?start.elapsed(),
                "Object downloaded"
            ),
            Err(err) => error!(
                target: TRACING_TARGET_OBJECTS,
                key = %key,
                local = %local.display(),
                error = %err,
                elapsed = ?start.elapsed(),
                "Failed to download object"
            ),
        }

        result
    }

    /// Lists every object whose key starts with `prefix`, recursively.
    ///
    /// Pages are fetched as the stream is polled. See [`ObjectListing`] for
    /// how errors and cancellation end the stream.
    pub fn list_objects(&self, prefix: &str, ctx: &CallContext) -> ObjectListing {
        debug!(
            target: TRACING_TARGET_OBJECTS,
            bucket = %self.bucket,
            prefix = %prefix,
            "Listing objects"
        );
        ObjectListing::new(self.backend.list(prefix), prefix, ctx)
    }

    /// Removes `key`. Removing a missing object succeeds.
    #[instrument(skip(self, ctx), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.bucket, key = %key))]
    pub async fn remove(&self, key: &str, ctx: &CallContext) -> Result<()> {
        ctx.run(async {
            match self.backend.delete(key).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == BackendErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::remove(key, e)),
            }
        })
        .await?;

        debug!(target: TRACING_TARGET_OBJECTS, key = %key, "Object removed");
        Ok(())
    }

    fn log_upload<T>(&self, key: &str, size: u64, start: Instant, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => info!(
                target: TRACING_TARGET_OBJECTS,
                bucket = %self.bucket,
                key = %key,
                size,
                elapsed = ?start.elapsed(),
                "Object uploaded"
            ),
            Err(err) => error!(
                target: TRACING_TARGET_OBJECTS,
                bucket = %self.bucket,
                key = %key,
                error = %err,
                elapsed = ?start.elapsed(),
                "Failed to upload object"
            ),
        }
        result
    }
}

fn upload_info(
    key: &str,
    size: u64,
    output: PutOutput,
    options: &UploadOptions,
    sha256: String,
) -> UploadInfo {
    UploadInfo {
        key: key.to_string(),
        size,
        etag: output.etag,
        version: output.version,
        content_type: options.content_type.map(str::to_string),
        visibility: options.visibility,
        sha256,
    }
}

/// Joins a remote prefix and a file name with exactly one `/`.
fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Regular files directly inside `dir` paired with their remote keys, sorted by name.
///
/// Symlinks are followed. Directories and other non-regular entries are
/// skipped; an entry that cannot be inspected fails the whole upload.
async fn regular_files(dir: &Path, remote_prefix: &str) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let remote = join_key(remote_prefix, &entry.file_name().to_string_lossy());

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                return Err(Error::UploadDirectory {
                    local: path,
                    remote,
                    uploaded: Vec::new(),
                    source: Box::new(Error::Io(err)),
                });
            }
        };

        if !metadata.is_file() {
            debug!(
                target: TRACING_TARGET_OBJECTS,
                path = %path.display(),
                "Skipping non-file entry"
            );
            continue;
        }
        files.push((remote, path));
    }

    files.sort_by(|a, b| a.1.file_name().cmp(&b.1.file_name()));
    Ok(files)
}

/// Hashes the first `len` bytes of `file`, then rewinds it.
async fn file_digest(file: &mut File, len: u64) -> std::io::Result<String> {
    let mut reader = HashingReader::new((&mut *file).take(len));
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    let digest = reader.finalize_hex();

    file.rewind().await?;
    Ok(digest)
}

/// Recovers the backend error of a body stream that failed mid-transfer.
fn download_error(key: &str, err: std::io::Error) -> Error {
    if !err.get_ref().is_some_and(|inner| inner.is::<BackendError>()) {
        return Error::Io(err);
    }

    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<BackendError>()) {
        Some(Ok(source)) => Error::download(key, *source),
        Some(Err(inner)) => Error::Io(std::io::Error::new(kind, inner)),
        None => Error::Io(kind.into()),
    }
}
