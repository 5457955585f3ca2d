#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for client construction and bucket checks.
pub const TRACING_TARGET_CLIENT: &str = "stowage::client";

/// Tracing target for object uploads, downloads, listings and removals.
pub const TRACING_TARGET_OBJECTS: &str = "stowage::objects";

/// Tracing target for requests issued by the store backends.
pub const TRACING_TARGET_BACKEND: &str = "stowage::backend";

/// Tracing target for local file writes.
pub const TRACING_TARGET_FS: &str = "stowage::fs";

pub mod backend;
mod client;
pub mod codec;
pub mod content_type;
mod error;
pub mod fs;
pub mod object;

#[doc(hidden)]
pub mod prelude;

pub use client::{CallContext, Client, ObjectListing, StoreConfig};
pub use error::{Error, Result};
pub use object::{DownloadInfo, ObjectInfo, Presence, UploadInfo, Visibility};
