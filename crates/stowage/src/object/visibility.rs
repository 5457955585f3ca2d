//! Object visibility and per-call upload options.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::content_type;

/// Whether an uploaded object is readable without authentication.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Visibility {
    /// Readable by anyone over HTTPS.
    Public,
    /// Readable only with credentials.
    #[default]
    Private,
}

impl Visibility {
    /// Canned ACL sent with public uploads.
    pub const PUBLIC_READ_ACL: &'static str = "public-read";

    /// Returns the canned ACL for this visibility, if one must be sent.
    pub fn canned_acl(self) -> Option<&'static str> {
        match self {
            Self::Public => Some(Self::PUBLIC_READ_ACL),
            Self::Private => None,
        }
    }

    /// Returns whether this is [`Visibility::Public`].
    #[inline]
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }
}

/// Metadata attached to a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Content type derived from the object key, if recognised.
    pub content_type: Option<&'static str>,
    /// Visibility of the object.
    pub visibility: Visibility,
}

impl UploadOptions {
    /// Derives upload options from the object key and visibility.
    pub fn for_key(key: &str, visibility: Visibility) -> Self {
        Self {
            content_type: content_type::resolve(key),
            visibility,
        }
    }
}
