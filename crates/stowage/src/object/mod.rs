//! Object metadata, upload options and public URLs.

mod object_info;
mod object_url;
mod presence;
mod visibility;

pub use object_info::{DownloadInfo, ObjectInfo, UploadInfo};
pub use object_url::ObjectUrl;
pub use presence::Presence;
pub use visibility::{UploadOptions, Visibility};
