//! Convenience re-exports.

pub use crate::backend::{BackendError, MemoryBackend, ObjectBackend, S3Backend};
pub use crate::client::{CallContext, Client, ObjectListing, StoreConfig};
pub use crate::error::{Error, Result};
pub use crate::object::{DownloadInfo, ObjectInfo, Presence, UploadInfo, Visibility};
