//! Remote object service contract.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// An object fetched from the remote service.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub body: Bytes,
    /// `Content-Encoding` the object was stored with.
    pub content_encoding: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Minimal key/object service used by [`ObjectStore`](super::ObjectStore).
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Fetch `key`. With `if_modified_since`, an object not modified after
    /// that instant is reported as `None`, the same as a missing one.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<Option<RemoteObject>>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_encoding: &str,
    ) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}
