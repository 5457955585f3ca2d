//! Public HTTPS URLs for objects.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

use crate::{Error, Result};

/// Bytes escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Builds public URLs of the form `https://<bucket>.<endpoint>/<key>`.
///
/// Pure string construction: no request is made and the object is not
/// required to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUrl {
    base: Url,
}

impl ObjectUrl {
    /// Creates a URL builder for `bucket` served from `endpoint`.
    pub fn new(bucket: &str, endpoint: &str) -> Result<Self> {
        let base = Url::parse(&format!("https://{bucket}.{endpoint}/"))
            .map_err(|e| Error::config(format!("invalid bucket URL: {e}")))?;

        if base.cannot_be_a_base() || base.host().is_none() {
            return Err(Error::config(format!("invalid bucket URL: {base}")));
        }

        Ok(Self { base })
    }

    /// Returns the bucket base URL, always ending with `/`.
    #[inline]
    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    /// Returns the URL of `key`.
    ///
    /// Leading slashes are ignored and every path segment is percent-encoded.
    /// Segments are kept verbatim: `.` and `..` are escaped, not resolved.
    pub fn for_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        let path: Vec<String> = key.split('/').map(encode_segment).collect();
        format!("{}{}", self.base, path.join("/"))
    }
}

fn encode_segment(segment: &str) -> String {
    match segment {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => utf8_percent_encode(segment, SEGMENT).to_string(),
    }
}
