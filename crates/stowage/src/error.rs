//! Error types and utilities for bucket operations.

use std::path::PathBuf;

use crate::backend::BackendError;

/// Result type for all bucket operations in this crate.
///
/// This is a convenience type alias that defaults to using [`Error`] as the error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for bucket operations.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum Error {
    /// A required configuration field is missing or malformed.
    ///
    /// Raised before any request reaches the store.
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// The store could not be reached or rejected the credentials.
    #[error("Connection error: {source}")]
    Connection {
        #[source]
        source: BackendError,
    },

    /// The configured bucket does not exist.
    #[error("Bucket '{bucket}' does not exist")]
    BucketNotFound { bucket: String },

    /// Uploading an object failed.
    #[error("Upload of '{key}' failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: BackendError,
    },

    /// Uploading one file of a directory failed.
    ///
    /// Objects uploaded before the failure are left in place and listed in `uploaded`.
    #[error("Upload of '{}' as '{remote}' failed: {source}", local.display())]
    UploadDirectory {
        local: PathBuf,
        remote: String,
        uploaded: Vec<String>,
        #[source]
        source: Box<Error>,
    },

    /// Downloading an object failed.
    #[error("Download of '{key}' failed: {source}")]
    Download {
        key: String,
        #[source]
        source: BackendError,
    },

    /// Reading object metadata failed.
    #[error("Stat of '{key}' failed: {source}")]
    Stat {
        key: String,
        #[source]
        source: BackendError,
    },

    /// Listing objects failed.
    #[error("Listing of prefix '{prefix}' failed: {source}")]
    List {
        prefix: String,
        #[source]
        source: BackendError,
    },

    /// Removing an object failed.
    #[error("Removal of '{key}' failed: {source}")]
    Remove {
        key: String,
        #[source]
        source: BackendError,
    },

    /// Local filesystem or compression failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call context was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The call context deadline passed before the operation completed.
    #[error("Operation deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(source: BackendError) -> Self {
        Self::Connection { source }
    }

    /// Create a bucket not found error.
    pub fn bucket_not_found(bucket: impl Into<String>) -> Self {
        Self::BucketNotFound {
            bucket: bucket.into(),
        }
    }

    /// Create an upload error.
    pub fn upload(key: impl Into<String>, source: BackendError) -> Self {
        Self::Upload {
            key: key.into(),
            source,
        }
    }

    /// Create a download error.
    pub fn download(key: impl Into<String>, source: BackendError) -> Self {
        Self::Download {
            key: key.into(),
            source,
        }
    }

    /// Create a stat error.
    pub fn stat(key: impl Into<String>, source: BackendError) -> Self {
        Self::Stat {
            key: key.into(),
            source,
        }
    }

    /// Create a listing error.
    pub fn list(prefix: impl Into<String>, source: BackendError) -> Self {
        Self::List {
            prefix: prefix.into(),
            source,
        }
    }

    /// Create a removal error.
    pub fn remove(key: impl Into<String>, source: BackendError) -> Self {
        Self::Remove {
            key: key.into(),
            source,
        }
    }

    /// Returns whether this error indicates a configuration issue.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns whether the object or bucket was reported as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::BucketNotFound { .. } => true,
            Self::Download { source, .. }
            | Self::Stat { source, .. }
            | Self::Remove { source, .. } => source.is_not_found(),
            Self::UploadDirectory { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns whether the call context stopped the operation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => true,
            Self::UploadDirectory { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
