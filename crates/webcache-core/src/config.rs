//! Centralized configuration for webcache.
//!
//! Constant groups for the stores and the HTTP client, plus the explicit
//! settings value the object store is constructed from.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Filesystem store configuration.
pub struct StoreConfig;

impl StoreConfig {
    /// Permission bits for newly created cache files (unix only).
    pub const FILE_MODE: u32 = 0o600;
    /// Read buffer size used when draining an entry.
    pub const READ_CHUNK_SIZE: usize = 8192;
}

/// Object store configuration.
pub struct ObjectStoreConfig;

impl ObjectStoreConfig {
    pub const DEFAULT_REGION: &'static str = "us-east-1";
    pub const REGION_ENV_VAR: &'static str = "AWS_REGION";
    /// Encoding tag attached to every uploaded object.
    pub const CONTENT_ENCODING: &'static str = "gzip";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = concat!("webcache/", env!("CARGO_PKG_VERSION"));
}

/// Settings for an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ObjectStoreSettings {
    /// Bucket holding the cache objects.
    pub bucket: String,
    /// Service region, used to build the default endpoint.
    pub region: String,
    /// Custom endpoint (S3-compatible gateway). Objects are addressed
    /// path-style under it when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Propagate fetch failures from `open` instead of treating them as a miss.
    #[serde(default)]
    pub strict_fetch: bool,
}

impl ObjectStoreSettings {
    /// Settings for `bucket` in the default region.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: ObjectStoreConfig::DEFAULT_REGION.to_string(),
            endpoint: None,
            strict_fetch: false,
        }
    }

    /// Settings for `bucket`, taking the region from `AWS_REGION`.
    pub fn from_env(bucket: impl Into<String>) -> Self {
        let region = std::env::var(ObjectStoreConfig::REGION_ENV_VAR)
            .ok()
            .filter(|r| !r.trim().is_empty());
        let settings = Self::new(bucket);
        match region {
            Some(region) => settings.with_region(region),
            None => settings,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_strict_fetch(mut self, strict: bool) -> Self {
        self.strict_fetch = strict;
        self
    }

    /// Base URL under which `{key}` is appended.
    pub fn object_base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}
