//! Snapshots describing stored objects and completed transfers.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Visibility;

/// Metadata of a stored object, as reported by the store.
///
/// This is a snapshot taken when the listing or stat request was served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key within the bucket.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: Option<Timestamp>,
    /// Entity tag, if the store returned one.
    pub etag: Option<String>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    /// Key the object was stored under.
    pub key: String,
    /// Number of bytes stored.
    pub size: u64,
    /// Entity tag of the new object, if the store returned one.
    pub etag: Option<String>,
    /// Version of the new object, if the bucket is versioned.
    pub version: Option<String>,
    /// Content type sent with the object.
    pub content_type: Option<String>,
    /// Visibility the object was uploaded with.
    pub visibility: Visibility,
    /// Hex-encoded SHA-256 of the stored bytes.
    pub sha256: String,
}

/// Result of a successful download to a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Key of the downloaded object.
    pub key: String,
    /// Number of bytes written.
    pub size: u64,
    /// Hex-encoded SHA-256 of the written bytes.
    pub sha256: String,
}
