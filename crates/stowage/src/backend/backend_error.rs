//! Minimal error type for backend requests.

use std::fmt;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The requested object does not exist.
    NotFound,
    /// The bucket itself does not exist.
    BucketNotFound,
    /// The credentials were rejected or lack permission.
    PermissionDenied,
    /// Anything else: transport failures, throttling, server errors.
    Other,
}

/// A lightweight error carrying a kind, a message and an optional source.
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
    source: Option<BoxedError>,
}

impl BackendError {
    /// Create an error of the given kind.
    pub fn new(kind: BackendErrorKind, msg: impl fmt::Display) -> Self {
        Self {
            kind,
            message: msg.to_string(),
            source: None,
        }
    }

    /// Create an object-not-found error for `key`.
    pub fn not_found(key: &str) -> Self {
        Self::new(BackendErrorKind::NotFound, format!("object '{key}' not found"))
    }

    /// Create a bucket-not-found error for `bucket`.
    pub fn bucket_not_found(bucket: &str) -> Self {
        Self::new(
            BackendErrorKind::BucketNotFound,
            format!("bucket '{bucket}' not found"),
        )
    }

    /// Create an unclassified error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Self::new(BackendErrorKind::Other, msg)
    }

    /// Attach a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the failure classification.
    #[inline]
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    /// Whether the object or bucket was reported as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::NotFound | BackendErrorKind::BucketNotFound
        )
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self::other(format!("local I/O failed: {err}")).with_source(err)
    }
}
