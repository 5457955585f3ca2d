//! Bucket client configuration.
//!
//! [`StoreConfig`] carries the static credentials, the bucket name and the
//! endpoint host of an S3-compatible store. All four are mandatory and are
//! checked by [`StoreConfig::validate`] before any request is made.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Default values
const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for a bucket client.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Access key for request signing.
    pub access_key: String,

    /// Secret key for request signing.
    /// Never serialized and masked in debug output.
    #[serde(skip_serializing, default)]
    pub secret_key: String,

    /// Name of the bucket all operations target.
    pub bucket: String,

    /// Endpoint host, optionally with a port (e.g. `s3.example.com` or `localhost:9000`).
    pub endpoint: String,

    /// Signing region, `us-east-1` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Address the bucket as `<bucket>.<endpoint>` instead of `<endpoint>/<bucket>`.
    #[serde(default)]
    pub virtual_hosted_style: bool,

    /// Per-request timeout in seconds (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl StoreConfig {
    /// Creates a new configuration from the four mandatory fields.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            region: None,
            virtual_hosted_style: false,
            request_timeout_secs: None,
        }
    }

    /// Returns the signing region, using the default if not set.
    #[inline]
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Returns the request timeout as a Duration, if set.
    #[inline]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the HTTPS endpoint URL the transport talks to.
    ///
    /// The bucket is added by the transport, as a host label or a path
    /// segment depending on [`StoreConfig::virtual_hosted_style`].
    #[inline]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}", self.endpoint)
    }

    /// Returns the access key with all but the first four characters masked.
    pub fn access_key_masked(&self) -> String {
        match self.access_key.get(..4) {
            Some(head) if self.access_key.len() > 4 => format!("{head}***"),
            _ => "***".to_string(),
        }
    }

    /// Set the signing region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Enable or disable virtual-hosted-style addressing.
    #[must_use]
    pub fn with_virtual_hosted_style(mut self, enabled: bool) -> Self {
        self.virtual_hosted_style = enabled;
        self
    }

    /// Set the per-request timeout in seconds.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Validate the configuration.
    ///
    /// Every empty mandatory field is reported in a single error.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("bucket", &self.bucket),
            ("endpoint", &self.endpoint),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(Error::config(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        if self.endpoint.contains("://") {
            return Err(Error::config(
                "endpoint must be a host name without a scheme",
            ));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(Error::config("request timeout must be greater than zero"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("access_key", &self.access_key_masked())
            .field("secret_key", &"***")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region())
            .field("virtual_hosted_style", &self.virtual_hosted_style)
            .field("request_timeout", &self.request_timeout())
            .finish()
    }
}
