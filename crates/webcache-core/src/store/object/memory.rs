//! In-process object service.

use super::client::{ObjectClient, RemoteObject};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_encoding: String,
    last_modified: DateTime<Utc>,
}

/// [`ObjectClient`] keeping objects in memory, with the same conditional-get
/// semantics as the HTTP client. Useful for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_object` calls served so far.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put_object` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Stored (still encoded) body and encoding of `key`.
    pub fn raw_object(&self, bucket: &str, key: &str) -> Option<(Bytes, String)> {
        let objects = self.objects.lock().ok()?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| (o.body.clone(), o.content_encoding.clone()))
    }

    /// Override the last-modified time of `key`. Returns false if absent.
    pub fn set_last_modified(&self, bucket: &str, key: &str, at: DateTime<Utc>) -> bool {
        let Ok(mut objects) = self.objects.lock() else {
            return false;
        };
        match objects.get_mut(&(bucket.to_string(), key.to_string())) {
            Some(object) => {
                object.last_modified = at;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), StoredObject>>> {
        self.objects.lock().map_err(|e| CacheError::ObjectService {
            key: String::new(),
            status: None,
            message: format!("Object map poisoned: {}", e),
        })
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<Option<RemoteObject>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let objects = self.lock()?;
        let Some(object) = objects.get(&(bucket.to_string(), key.to_string())) else {
            return Ok(None);
        };
        if let Some(since) = if_modified_since {
            if object.last_modified <= since {
                return Ok(None);
            }
        }
        Ok(Some(RemoteObject {
            body: object.body.clone(),
            content_encoding: Some(object.content_encoding.clone()),
            last_modified: Some(object.last_modified),
        }))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_encoding: &str,
    ) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.lock()?;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_encoding: content_encoding.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut objects = self.lock()?;
        objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_conditional_get() {
        let client = MemoryObjectClient::new();
        client
            .put_object("b", "k", Bytes::from_static(b"v"), "identity")
            .await
            .unwrap();

        let past = Utc::now() - Duration::minutes(5);
        assert!(client.get_object("b", "k", Some(past)).await.unwrap().is_some());

        let future = Utc::now() + Duration::minutes(5);
        assert!(client.get_object("b", "k", Some(future)).await.unwrap().is_none());

        assert!(client.get_object("b", "k", None).await.unwrap().is_some());
        assert!(client.get_object("other", "k", None).await.unwrap().is_none());
        assert_eq!(client.get_count(), 4);
    }

    #[tokio::test]
    async fn test_delete_and_last_modified_override() {
        let client = MemoryObjectClient::new();
        client
            .put_object("b", "k", Bytes::from_static(b"v"), "gzip")
            .await
            .unwrap();

        let old = Utc::now() - Duration::hours(2);
        assert!(client.set_last_modified("b", "k", old));
        let fetched = client.get_object("b", "k", None).await.unwrap().unwrap();
        assert_eq!(fetched.last_modified, Some(old));
        assert_eq!(fetched.content_encoding.as_deref(), Some("gzip"));

        client.delete_object("b", "k").await.unwrap();
        assert!(client.raw_object("b", "k").is_none());
        assert!(!client.set_last_modified("b", "k", old));
    }
}
