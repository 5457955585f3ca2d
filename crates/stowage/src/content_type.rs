//! Content-type resolution from object keys.

/// Resolves the MIME type of an object from the extension of its key.
///
/// Returns `None` for unrecognised or missing extensions. Such objects are
/// stored without a content type and the store falls back to its
/// `application/octet-stream` default.
pub fn resolve(key: &str) -> Option<&'static str> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    mime_guess::from_path(file_name).first_raw()
}
