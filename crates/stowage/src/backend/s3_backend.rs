//! S3-compatible backend built on the AWS SDK.
//!
//! Every request is signed with the static credentials of a [`StoreConfig`];
//! nothing is read from the environment or shared AWS profiles. Retries are
//! disabled so that a single call maps to a single attempt and the caller's
//! deadline stays meaningful.

use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::primitives::{ByteStream, DateTime, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Object, ObjectCannedAcl};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::{BoxStream, Fuse};
use jiff::Timestamp;
use tokio::fs::File;

use super::{BackendError, BackendErrorKind, BodyStream, ListStream, ObjectBackend, PutOutput};
use crate::TRACING_TARGET_BACKEND;
use crate::client::StoreConfig;
use crate::object::{ObjectInfo, UploadOptions};

/// Size of each part of a streamed upload.
///
/// Bodies that end before the first part fills are sent with a single put.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

const CREDENTIALS_PROVIDER: &str = "stowage";

/// Backend talking to an S3-compatible endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Builds a backend from a validated configuration.
    ///
    /// No request is made; use [`ObjectBackend::bucket_exists`] to check reachability.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: Client::from_conf(sdk_config(config)),
            bucket: config.bucket.clone(),
        }
    }

    /// Returns the bucket this backend is bound to.
    #[inline]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> Result<String, BackendError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(options.content_type.map(str::to_string))
            .set_acl(canned_acl(options))
            .send()
            .await
            .map_err(|err| classify(err, key))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| BackendError::other(format!("no upload id returned for '{key}'")))
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        mut parts: PartStream,
    ) -> Result<Vec<CompletedPart>, BackendError> {
        let mut completed = Vec::new();
        let mut next = Some(Ok(first));

        while let Some(part) = next {
            let part = part?;
            let part_number = completed.len() as i32 + 1;
            let size = part.len();
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(size as i64)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|err| classify(err, key))?;

            tracing::trace!(
                target: TRACING_TARGET_BACKEND,
                key = %key,
                part_number,
                size,
                "Uploaded part"
            );

            completed.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            next = parts.next().await;
        }

        Ok(completed)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<PutOutput, BackendError> {
        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| classify(err, key))?;

        Ok(PutOutput {
            etag: output.e_tag().map(str::to_string),
            version: output.version_id().map(str::to_string),
        })
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(err) = result {
            tracing::warn!(
                target: TRACING_TARGET_BACKEND,
                key = %key,
                upload_id = %upload_id,
                error = %DisplayErrorContext(&err),
                "Failed to abort multipart upload"
            );
        }
    }
}

#[async_trait::async_trait]
impl ObjectBackend for S3Backend {
    async fn bucket_exists(&self) -> Result<bool, BackendError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = classify(err, &self.bucket);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn head(&self, key: &str) -> Result<ObjectInfo, BackendError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, key))?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: output.content_length().unwrap_or_default().max(0) as u64,
            last_modified: output.last_modified().and_then(timestamp),
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .set_content_type(options.content_type.map(str::to_string))
            .set_acl(canned_acl(options))
            .send()
            .await
            .map_err(|err| classify(err, key))?;

        Ok(PutOutput {
            etag: output.e_tag().map(str::to_string),
            version: output.version_id().map(str::to_string),
        })
    }

    async fn put_file(
        &self,
        key: &str,
        file: File,
        len: u64,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        let body = ByteStream::read_from()
            .file(file)
            .length(Length::Exact(len))
            .build()
            .await
            .map_err(|err| {
                BackendError::other(format!("opening body of '{key}' failed: {err}"))
                    .with_source(err)
            })?;

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(len as i64)
            .body(body)
            .set_content_type(options.content_type.map(str::to_string))
            .set_acl(canned_acl(options))
            .send()
            .await
            .map_err(|err| classify(err, key))?;

        Ok(PutOutput {
            etag: output.e_tag().map(str::to_string),
            version: output.version_id().map(str::to_string),
        })
    }

    async fn put_stream(
        &self,
        key: &str,
        body: BodyStream,
        options: &UploadOptions,
    ) -> Result<PutOutput, BackendError> {
        let mut parts = split_parts(body);
        let first = match parts.next().await {
            Some(part) => part?,
            None => Bytes::new(),
        };
        if first.len() < PART_SIZE {
            return self.put(key, first, options).await;
        }

        let upload_id = self.create_multipart(key, options).await?;
        tracing::debug!(
            target: TRACING_TARGET_BACKEND,
            key = %key,
            upload_id = %upload_id,
            "Started multipart upload"
        );

        let result = match self.upload_parts(key, &upload_id, first, parts).await {
            Ok(parts) => self.complete_multipart(key, &upload_id, parts).await,
            Err(err) => Err(err),
        };

        if result.is_err() {
            self.abort_multipart(key, &upload_id).await;
        }

        result
    }

    async fn get(&self, key: &str) -> Result<BodyStream, BackendError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, key))?;

        let key = key.to_string();
        let stream = futures::stream::unfold(output.body, move |mut body| {
            let key = key.clone();
            async move {
                let chunk = body.next().await?.map_err(|err| {
                    BackendError::other(format!("reading body of '{key}' failed: {err}"))
                        .with_source(err)
                });
                Some((chunk, body))
            }
        });

        Ok(stream.boxed())
    }

    fn list(&self, prefix: &str) -> ListStream {
        let subject = prefix.to_string();
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        let pages = request.into_paginator().send();

        futures::stream::unfold(pages, move |mut pages| {
            let subject = subject.clone();
            async move {
                let page = pages.next().await?;
                let items = page_items(page.map_err(|err| classify(err, &subject)));
                Some((futures::stream::iter(items), pages))
            }
        })
        .flatten()
        .boxed()
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => match classify(err, key) {
                err if err.kind() == BackendErrorKind::NotFound => Ok(()),
                err => Err(err),
            },
        }
    }
}

/// Builds the SDK configuration without consulting the environment.
fn sdk_config(config: &StoreConfig) -> aws_sdk_s3::Config {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        CREDENTIALS_PROVIDER,
    );

    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region().to_string()))
        .endpoint_url(config.endpoint_url())
        .credentials_provider(credentials)
        .force_path_style(!config.virtual_hosted_style)
        .retry_config(RetryConfig::disabled());

    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout_config(
            TimeoutConfig::builder()
                .operation_attempt_timeout(timeout)
                .build(),
        );
    }

    builder.build()
}

type PartStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Regroups `body` into parts of exactly [`PART_SIZE`] bytes.
///
/// Only the last part may be shorter, and it is never empty.
fn split_parts(body: BodyStream) -> PartStream {
    futures::stream::try_unfold(
        (body.fuse(), BytesMut::new()),
        |(mut body, mut buffer)| async move {
            let part = next_part(&mut body, &mut buffer).await;
            part.map(move |part| part.map(|part| (part, (body, buffer))))
        },
    )
    .boxed()
}

async fn next_part(
    body: &mut Fuse<BodyStream>,
    buffer: &mut BytesMut,
) -> Result<Option<Bytes>, BackendError> {
    while buffer.len() < PART_SIZE {
        match body.next().await {
            Some(chunk) => buffer.extend_from_slice(&chunk?),
            None if buffer.is_empty() => return Ok(None),
            None => return Ok(Some(buffer.split().freeze())),
        }
    }

    Ok(Some(buffer.split_to(PART_SIZE).freeze()))
}

/// Flattens one listing page into its objects, or into its error.
fn page_items(
    page: Result<ListObjectsV2Output, BackendError>,
) -> Vec<Result<ObjectInfo, BackendError>> {
    match page {
        Ok(output) => output
            .contents
            .unwrap_or_default()
            .into_iter()
            .map(|object| Ok(object_info(object)))
            .collect(),
        Err(err) => vec![Err(err)],
    }
}

fn canned_acl(options: &UploadOptions) -> Option<ObjectCannedAcl> {
    options.visibility.canned_acl().map(ObjectCannedAcl::from)
}

fn object_info(object: Object) -> ObjectInfo {
    ObjectInfo {
        key: object.key().unwrap_or_default().to_string(),
        size: object.size().unwrap_or_default().max(0) as u64,
        last_modified: object.last_modified().and_then(timestamp),
        etag: object.e_tag().map(str::to_string),
    }
}

fn timestamp(time: &DateTime) -> Option<Timestamp> {
    Timestamp::new(time.secs(), time.subsec_nanos() as i32).ok()
}

/// Maps an SDK failure onto a [`BackendError`] for `subject` (a key, prefix or bucket).
fn classify<E>(err: SdkError<E, HttpResponse>, subject: &str) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let kind = error_kind(err.code(), status);
    let message = format!("request for '{subject}' failed: {}", DisplayErrorContext(&err));

    BackendError::new(kind, message).with_source(err)
}

fn error_kind(code: Option<&str>, status: Option<u16>) -> BackendErrorKind {
    match (code, status) {
        (Some("NoSuchBucket"), _) => BackendErrorKind::BucketNotFound,
        (Some("NoSuchKey" | "NotFound"), _) | (_, Some(404)) => BackendErrorKind::NotFound,
        (Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _)
        | (_, Some(401 | 403)) => BackendErrorKind::PermissionDenied,
        _ => BackendErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Visibility;

    #[test]
    fn test_error_kind_from_code() {
        assert_eq!(
            error_kind(Some("NoSuchBucket"), Some(404)),
            BackendErrorKind::BucketNotFound
        );
        assert_eq!(error_kind(Some("NoSuchKey"), None), BackendErrorKind::NotFound);
        assert_eq!(
            error_kind(Some("AccessDenied"), Some(403)),
            BackendErrorKind::PermissionDenied
        );
        assert_eq!(error_kind(Some("SlowDown"), Some(503)), BackendErrorKind::Other);
    }

    #[test]
    fn test_error_kind_from_status() {
        assert_eq!(error_kind(None, Some(404)), BackendErrorKind::NotFound);
        assert_eq!(error_kind(None, Some(401)), BackendErrorKind::PermissionDenied);
        assert_eq!(error_kind(None, None), BackendErrorKind::Other);
    }

    #[test]
    fn test_object_info_from_listing() {
        let object = Object::builder()
            .key("logs/2024-01.txt")
            .size(42)
            .e_tag("\"abc\"")
            .last_modified(DateTime::from_secs(1_700_000_000))
            .build();

        let info = object_info(object);
        assert_eq!(info.key, "logs/2024-01.txt");
        assert_eq!(info.size, 42);
        assert_eq!(info.etag.as_deref(), Some("\"abc\""));
        assert_eq!(info.last_modified.map(|t| t.as_second()), Some(1_700_000_000));
    }

    #[test]
    fn test_listing_page_items() {
        let page = ListObjectsV2Output::builder()
            .contents(Object::builder().key("logs/a.txt").size(1).build())
            .contents(Object::builder().key("logs/b.txt").size(2).build())
            .build();

        let items = page_items(Ok(page));
        let keys: Vec<_> = items.iter().map(|item| item.as_ref().unwrap().key.as_str()).collect();
        assert_eq!(keys, vec!["logs/a.txt", "logs/b.txt"]);

        let empty = page_items(Ok(ListObjectsV2Output::builder().build()));
        assert!(empty.is_empty());

        let failed = page_items(Err(BackendError::other("page failed")));
        assert_eq!(failed.len(), 1);
        assert!(failed[0].is_err());
    }

    /// Splits `len` bytes, delivered in uneven chunks, and returns the part sizes.
    async fn part_sizes(len: usize) -> Vec<usize> {
        let data = vec![7u8; len];
        let chunks: Vec<Result<Bytes, BackendError>> = data
            .chunks(1_000_003)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();

        split_parts(futures::stream::iter(chunks).boxed())
            .map(|part| part.unwrap().len())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_split_parts_boundaries() {
        assert_eq!(part_sizes(0).await, Vec::<usize>::new());
        assert_eq!(part_sizes(1).await, vec![1]);
        assert_eq!(part_sizes(PART_SIZE - 1).await, vec![PART_SIZE - 1]);
        assert_eq!(part_sizes(PART_SIZE).await, vec![PART_SIZE]);
        assert_eq!(part_sizes(PART_SIZE + 1).await, vec![PART_SIZE, 1]);
        assert_eq!(part_sizes(2 * PART_SIZE).await, vec![PART_SIZE, PART_SIZE]);
    }

    #[tokio::test]
    async fn test_split_parts_keeps_bytes_in_order() {
        let data: Vec<u8> = (0..PART_SIZE + 5).map(|i| (i % 251) as u8).collect();
        let chunks: Vec<Result<Bytes, BackendError>> = data
            .chunks(4_096)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();

        let parts: Vec<Bytes> = split_parts(futures::stream::iter(chunks).boxed())
            .map(|part| part.unwrap())
            .collect()
            .await;
        assert_eq!(parts.concat(), data);
    }

    #[tokio::test]
    async fn test_split_parts_stops_at_body_error() {
        let body = futures::stream::iter([
            Ok(Bytes::from_static(b"abc")),
            Err(BackendError::other("connection reset")),
        ])
        .boxed();

        let parts: Vec<_> = split_parts(body).collect().await;
        assert_eq!(parts.len(), 1);
        assert!(parts[0].is_err());
    }

    #[test]
    fn test_canned_acl_follows_visibility() {
        let public = UploadOptions::for_key("a.html", Visibility::Public);
        let private = UploadOptions::for_key("a.html", Visibility::Private);

        assert_eq!(canned_acl(&public), Some(ObjectCannedAcl::PublicRead));
        assert_eq!(canned_acl(&private), None);
    }

    #[tokio::test]
    async fn test_backend_binds_bucket() {
        let config = StoreConfig::new("access", "secret", "assets", "localhost:9000")
            .with_request_timeout_secs(5);

        let backend = S3Backend::new(&config);
        assert_eq!(backend.bucket(), "assets");

        let sdk = sdk_config(&config);
        assert_eq!(
            sdk.region().map(ToString::to_string),
            Some("us-east-1".to_string())
        );
    }
}
