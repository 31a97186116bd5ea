//! Object store backed by a remote key/object service.
//!
//! Freshness is delegated to the service through conditional fetches, and
//! payloads are stored gzip-compressed. There is no coordination between
//! callers: concurrent writers race to a last-write-wins overwrite, and a
//! reader racing a writer sees either version.

mod client;
mod http;
mod memory;

pub use client::{ObjectClient, RemoteObject};
pub use http::{format_http_date, parse_http_date, HttpObjectClient};
pub use memory::MemoryObjectClient;

use super::traits::{key_segments, CacheEntry, CacheStore};
use crate::config::{ObjectStoreConfig, ObjectStoreSettings};
use crate::error::{CacheError, Result};
use crate::ttl::Ttl;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Store keeping entries as objects in one bucket.
#[derive(Clone)]
pub struct ObjectStore {
    client: Arc<dyn ObjectClient>,
    settings: ObjectStoreSettings,
}

impl ObjectStore {
    pub fn new(client: Arc<dyn ObjectClient>, settings: ObjectStoreSettings) -> Self {
        Self { client, settings }
    }

    /// Store talking to the S3-compatible endpoint described by `settings`.
    pub fn connect(settings: ObjectStoreSettings) -> Result<Self> {
        let client = HttpObjectClient::new(&settings)?;
        Ok(Self::new(Arc::new(client), settings))
    }

    pub fn settings(&self) -> &ObjectStoreSettings {
        &self.settings
    }

    async fn fetch(&self, key: &str, ttl: Ttl) -> Result<Option<RemoteObject>> {
        let since = match ttl.cutoff(SystemTime::now()) {
            None => None,
            Some(cutoff) => Some(DateTime::<Utc>::from(cutoff)),
        };
        let fetched = self
            .client
            .get_object(&self.settings.bucket, key, since)
            .await;
        match fetched {
            Ok(object) => Ok(object),
            Err(e) if self.settings.strict_fetch => Err(e),
            Err(e) => {
                warn!(
                    "Fetching {}/{} failed, treating as a miss: {}",
                    self.settings.bucket, key, e
                );
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for ObjectStore {
    async fn open(&self, key: &str, ttl: Ttl) -> Result<Box<dyn CacheEntry>> {
        key_segments(key)?;
        // A refresh can never use the stored object, so skip the round trip.
        let object = if ttl == Ttl::Refresh {
            None
        } else {
            self.fetch(key, ttl).await?
        };
        debug!(
            "Opened {}/{} (ttl {:?}, valid: {})",
            self.settings.bucket,
            key,
            ttl,
            object.is_some()
        );
        Ok(Box::new(ObjectEntry {
            client: Arc::clone(&self.client),
            bucket: self.settings.bucket.clone(),
            key: key.to_string(),
            object,
            reader: None,
            writer: None,
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        key_segments(key)?;
        self.client.delete_object(&self.settings.bucket, key).await
    }
}

/// One object, fetched at open time and buffered for upload on close.
pub struct ObjectEntry {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    key: String,
    object: Option<RemoteObject>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<GzEncoder<Vec<u8>>>,
}

impl ObjectEntry {
    fn open_reader(object: &RemoteObject) -> Box<dyn Read + Send> {
        let body = Cursor::new(object.body.clone());
        let gzipped = object
            .content_encoding
            .as_deref()
            .is_some_and(|enc| enc.eq_ignore_ascii_case(ObjectStoreConfig::CONTENT_ENCODING))
            && object.body.starts_with(&GZIP_MAGIC);
        if gzipped {
            Box::new(GzDecoder::new(body))
        } else {
            Box::new(body)
        }
    }
}

#[async_trait]
impl CacheEntry for ObjectEntry {
    fn is_valid(&self) -> bool {
        self.object.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(object) = &self.object else {
            return Err(CacheError::Expired);
        };
        let reader = self
            .reader
            .get_or_insert_with(|| ObjectEntry::open_reader(object));
        Ok(reader.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let writer = self
            .writer
            .get_or_insert_with(|| GzEncoder::new(Vec::new(), Compression::default()));
        Ok(writer.write(data)?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut entry = self;
        entry.reader = None;
        let Some(writer) = entry.writer.take() else {
            return Ok(());
        };
        let compressed = writer.finish()?;
        debug!(
            "Uploading {}/{} ({} bytes compressed)",
            entry.bucket,
            entry.key,
            compressed.len()
        );

        let client = Arc::clone(&entry.client);
        let (bucket, key) = (entry.bucket.clone(), entry.key.clone());
        drop(entry);
        client
            .put_object(
                &bucket,
                &key,
                Bytes::from(compressed),
                ObjectStoreConfig::CONTENT_ENCODING,
            )
            .await
    }
}

impl Drop for ObjectEntry {
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!(
                "Discarding unflushed writes to {}/{}: entry dropped without close",
                self.bucket, self.key
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const BUCKET: &str = "cache-bucket";

    fn store_with(client: Arc<MemoryObjectClient>) -> ObjectStore {
        ObjectStore::new(client, ObjectStoreSettings::new(BUCKET))
    }

    async fn put(store: &ObjectStore, key: &str, data: &[u8]) {
        let mut entry = store.open(key, Ttl::Refresh).await.unwrap();
        entry.write_all(data).unwrap();
        entry.close().await.unwrap();
    }

    struct FailingClient;

    #[async_trait]
    impl ObjectClient for FailingClient {
        async fn get_object(
            &self,
            _bucket: &str,
            key: &str,
            _if_modified_since: Option<DateTime<Utc>>,
        ) -> Result<Option<RemoteObject>> {
            Err(CacheError::ObjectService {
                key: key.to_string(),
                status: Some(500),
                message: "internal error".into(),
            })
        }

        async fn put_object(&self, _: &str, key: &str, _: Bytes, _: &str) -> Result<()> {
            Err(CacheError::ObjectService {
                key: key.to_string(),
                status: Some(500),
                message: "internal error".into(),
            })
        }

        async fn delete_object(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_round_trip_is_compressed() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_with(client.clone());
        put(&store, "a/b", b"hello object store").await;

        let (raw, encoding) = client.raw_object(BUCKET, "a/b").unwrap();
        assert_eq!(encoding, "gzip");
        assert!(raw.starts_with(&GZIP_MAGIC));

        let mut entry = store
            .open("a/b", Ttl::MaxAge(Duration::from_secs(600)))
            .await
            .unwrap();
        assert!(entry.is_valid());
        assert_eq!(entry.read_to_end().unwrap(), b"hello object store");
        entry.close().await.unwrap();
        assert_eq!(client.put_count(), 1);
    }

    #[tokio::test]
    async fn test_old_object_is_invalid_for_max_age() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_with(client.clone());
        put(&store, "k", b"twenty minutes old").await;
        client.set_last_modified(BUCKET, "k", Utc::now() - chrono::Duration::minutes(20));

        let entry = store
            .open("k", Ttl::MaxAge(Duration::from_secs(600)))
            .await
            .unwrap();
        assert!(!entry.is_valid());

        let entry = store.open("k", Ttl::Forever).await.unwrap();
        assert!(entry.is_valid());
    }

    #[tokio::test]
    async fn test_refresh_skips_fetch() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_with(client.clone());
        put(&store, "k", b"data").await;

        let mut entry = store.open("k", Ttl::Refresh).await.unwrap();
        assert!(!entry.is_valid());
        assert!(matches!(entry.read(&mut [0u8; 8]), Err(CacheError::Expired)));
        assert_eq!(client.get_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_uploaded_until_close() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_with(client.clone());

        let mut entry = store.open("k", Ttl::Forever).await.unwrap();
        entry.write_all(b"first").unwrap();
        entry.write_all(b" second").unwrap();
        assert_eq!(client.put_count(), 0);
        entry.close().await.unwrap();
        assert_eq!(client.put_count(), 1);

        put(&store, "k", b"replaced").await;
        let mut entry = store.open("k", Ttl::Forever).await.unwrap();
        assert_eq!(entry.read_to_end().unwrap(), b"replaced");
    }

    #[tokio::test]
    async fn test_dropped_entry_uploads_nothing() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_with(client.clone());

        let mut entry = store.open("k", Ttl::Forever).await.unwrap();
        entry.write_all(b"lost").unwrap();
        drop(entry);
        assert_eq!(client.put_count(), 0);
    }

    #[tokio::test]
    async fn test_uncompressed_object_read_as_is() {
        let client = Arc::new(MemoryObjectClient::new());
        client
            .put_object(BUCKET, "plain", Bytes::from_static(b"raw bytes"), "identity")
            .await
            .unwrap();
        // Tagged gzip but not actually compressed: served raw.
        client
            .put_object(BUCKET, "mislabeled", Bytes::from_static(b"not gzip"), "gzip")
            .await
            .unwrap();
        let store = store_with(client);

        let mut entry = store.open("plain", Ttl::Forever).await.unwrap();
        assert_eq!(entry.read_to_end().unwrap(), b"raw bytes");
        let mut entry = store.open("mislabeled", Ttl::Forever).await.unwrap();
        assert_eq!(entry.read_to_end().unwrap(), b"not gzip");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_a_miss_unless_strict() {
        let lenient = ObjectStore::new(Arc::new(FailingClient), ObjectStoreSettings::new(BUCKET));
        let entry = lenient.open("k", Ttl::Forever).await.unwrap();
        assert!(!entry.is_valid());

        let strict = ObjectStore::new(
            Arc::new(FailingClient),
            ObjectStoreSettings::new(BUCKET).with_strict_fetch(true),
        );
        let result = strict.open("k", Ttl::Forever).await;
        assert!(matches!(result, Err(CacheError::ObjectService { .. })));
    }

    #[tokio::test]
    async fn test_upload_error_returned_from_close() {
        let store = ObjectStore::new(Arc::new(FailingClient), ObjectStoreSettings::new(BUCKET));
        let mut entry = store.open("k", Ttl::Refresh).await.unwrap();
        entry.write_all(b"data").unwrap();
        let result = entry.close().await;
        assert!(matches!(result, Err(CacheError::ObjectService { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let client = Arc::new(MemoryObjectClient::new());
        let store = store_with(client.clone());
        put(&store, "k", b"data").await;

        store.delete("k").await.unwrap();
        assert!(client.raw_object(BUCKET, "k").is_none());
        let entry = store.open("k", Ttl::Forever).await.unwrap();
        assert!(!entry.is_valid());
    }
}
