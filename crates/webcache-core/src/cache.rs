//! The read-through/write-through cache engine.
//!
//! Every operation opens one entry, serves it if the store marked it valid
//! and it reads back cleanly, and otherwise computes the value (producer or
//! live HTTP call) and writes it back. Failures reading a cached copy are
//! soft misses and only trigger recomputation. The entry is closed on every
//! path; a close that would publish a write counts as part of that write.

use crate::error::{BoxError, CacheError, Recovered, Result};
use crate::http::{request_key, CachedResponse};
use crate::network::HttpTransport;
use crate::store::{CacheEntry, CacheStore};
use crate::ttl::Ttl;
use bytes::Bytes;
use reqwest::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Content types accepted by the JSON request helpers.
pub const JSON_CONTENT_TYPES: &[&str] = &["application/json", "text/json", "application/javascript"];

/// Cache engine over a [`CacheStore`] and an [`HttpTransport`].
///
/// Holds no cached state of its own; clones share the same store and transport.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn HttpTransport>,
}

/// Outcome of filling an open entry.
enum Fill<T> {
    /// Served from the entry.
    Hit(T),
    /// Computed and written successfully (pending close).
    Stored(T),
    /// Computed but never written.
    Fresh(T),
    /// Computed; the write failed.
    WriteFailed(T, CacheError),
}

impl Cache {
    pub fn new(store: impl CacheStore + 'static, transport: impl HttpTransport + 'static) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(transport))
    }

    pub fn from_shared(store: Arc<dyn CacheStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Remove the entry stored under `name`.
    pub async fn invalidate(&self, name: &str) -> Result<()> {
        self.store.delete(name).await
    }

    /// Return the bytes cached under `name`, or run `producer` and cache its output.
    ///
    /// A producer error is returned as [`CacheError::Producer`] and leaves the
    /// entry untouched. A failed write returns [`CacheError::WriteBack`]
    /// carrying the produced bytes.
    pub async fn cache_func<F, Fut, E>(&self, name: &str, ttl: Ttl, producer: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<u8>, E>>,
        E: Into<BoxError>,
    {
        let mut entry = self.store.open(name, ttl).await?;
        let filled = fill_bytes(entry.as_mut(), name, producer).await;
        finish(entry, filled, Recovered::Bytes).await
    }

    /// Like [`cache_func`](Self::cache_func), persisting the JSON encoding of the value.
    ///
    /// Cached JSON that no longer decodes as `T` is a miss. A failed write
    /// returns [`CacheError::WriteBack`] carrying the encoded JSON.
    pub async fn cache_func_json<T, F, Fut, E>(&self, name: &str, ttl: Ttl, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let mut entry = self.store.open(name, ttl).await?;
        let filled = fill_json(entry.as_mut(), name, producer).await;
        let (value, _) = finish(entry, filled, |(_, json)| Recovered::Bytes(json)).await?;
        Ok(value)
    }

    /// Return the cached response to `request`, or perform it.
    ///
    /// Only `200 OK` answers to `GET` requests are stored. A failed write
    /// returns [`CacheError::WriteBack`] carrying the live response.
    pub async fn cache_request(&self, request: Request, ttl: Ttl) -> Result<CachedResponse> {
        let cacheable_method = *request.method() == Method::GET;
        let key = request_key(request.method(), request.url());
        let mut entry = self.store.open(&key, ttl).await?;
        let filled = self
            .fill_response(entry.as_mut(), &key, request, cacheable_method)
            .await;
        finish(entry, filled, Recovered::Response).await
    }

    /// [`cache_request`](Self::cache_request), returning only the body.
    pub async fn cache_request_data(&self, request: Request, ttl: Ttl) -> Result<Bytes> {
        Ok(self.cache_request(request, ttl).await?.into_body())
    }

    /// Cache a `GET` of `url`.
    pub async fn cache_url(&self, url: &str, ttl: Ttl) -> Result<CachedResponse> {
        self.cache_request(get_request(url)?, ttl).await
    }

    /// [`cache_url`](Self::cache_url), returning only the body.
    pub async fn cache_url_data(&self, url: &str, ttl: Ttl) -> Result<Bytes> {
        self.cache_request_data(get_request(url)?, ttl).await
    }

    /// Decode the (possibly cached) response to `request` as JSON.
    ///
    /// Fails with [`CacheError::NotJson`] unless the content type is one of
    /// [`JSON_CONTENT_TYPES`].
    pub async fn cache_request_json<T: DeserializeOwned>(
        &self,
        request: Request,
        ttl: Ttl,
    ) -> Result<T> {
        let response = self.cache_request(request, ttl).await?;
        let media_type = response.media_type().unwrap_or_default();
        if !JSON_CONTENT_TYPES.contains(&media_type.as_str()) {
            return Err(CacheError::NotJson {
                content_type: media_type,
            });
        }
        response.json()
    }

    /// [`cache_request_json`](Self::cache_request_json) for a `GET` of `url`.
    pub async fn cache_url_json<T: DeserializeOwned>(&self, url: &str, ttl: Ttl) -> Result<T> {
        self.cache_request_json(get_request(url)?, ttl).await
    }

    async fn fill_response(
        &self,
        entry: &mut dyn CacheEntry,
        key: &str,
        request: Request,
        cacheable_method: bool,
    ) -> Result<Fill<CachedResponse>> {
        if entry.is_valid() {
            match entry.read_to_end().and_then(|data| CachedResponse::from_wire(&data)) {
                Ok(response) => {
                    debug!("Cache hit for {} {}", request.method(), request.url());
                    return Ok(Fill::Hit(response));
                }
                Err(e) => debug!("Unusable cached response at {}: {}", key, e),
            }
        }

        debug!("Fetching {} {}", request.method(), request.url());
        let live = self.transport.execute(request).await?;
        let response = CachedResponse::from_response(live).await?;
        if !cacheable_method || response.status() != StatusCode::OK {
            return Ok(Fill::Fresh(response));
        }
        Ok(match entry.write_all(&response.to_wire()) {
            Ok(()) => Fill::Stored(response),
            Err(e) => Fill::WriteFailed(response, e),
        })
    }
}

async fn fill_bytes<F, Fut, E>(
    entry: &mut dyn CacheEntry,
    name: &str,
    producer: F,
) -> Result<Fill<Vec<u8>>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<u8>, E>>,
    E: Into<BoxError>,
{
    if entry.is_valid() {
        match entry.read_to_end() {
            Ok(data) => {
                debug!("Cache hit for {}", name);
                return Ok(Fill::Hit(data));
            }
            Err(e) => debug!("Unreadable cache entry {}: {}", name, e),
        }
    }

    let data = producer()
        .await
        .map_err(|e| CacheError::Producer(e.into()))?;
    Ok(match entry.write_all(&data) {
        Ok(()) => Fill::Stored(data),
        Err(e) => Fill::WriteFailed(data, e),
    })
}

/// Like [`fill_bytes`], keeping the JSON encoding alongside the value.
async fn fill_json<T, F, Fut, E>(
    entry: &mut dyn CacheEntry,
    name: &str,
    producer: F,
) -> Result<Fill<(T, Vec<u8>)>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    if entry.is_valid() {
        let cached = entry
            .read_to_end()
            .and_then(|data| Ok(serde_json::from_slice::<T>(&data)?));
        match cached {
            Ok(value) => {
                debug!("Cache hit for {}", name);
                return Ok(Fill::Hit((value, Vec::new())));
            }
            Err(e) => debug!("Unusable cached JSON at {}: {}", name, e),
        }
    }

    let value = producer()
        .await
        .map_err(|e| CacheError::Producer(e.into()))?;
    let json = serde_json::to_vec(&value)?;
    Ok(match entry.write_all(&json) {
        Ok(()) => Fill::Stored((value, json)),
        Err(e) => Fill::WriteFailed((value, json), e),
    })
}

/// Close `entry` and settle the result of filling it.
async fn finish<T>(
    entry: Box<dyn CacheEntry>,
    filled: Result<Fill<T>>,
    recover: impl FnOnce(T) -> Recovered,
) -> Result<T> {
    let fill = match filled {
        Ok(fill) => fill,
        Err(e) => {
            close_quietly(entry).await;
            return Err(e);
        }
    };
    match fill {
        Fill::Hit(value) | Fill::Fresh(value) => {
            close_quietly(entry).await;
            Ok(value)
        }
        Fill::Stored(value) => match entry.close().await {
            Ok(()) => Ok(value),
            Err(e) => Err(CacheError::write_back(e, recover(value))),
        },
        Fill::WriteFailed(value, e) => {
            close_quietly(entry).await;
            Err(CacheError::write_back(e, recover(value)))
        }
    }
}

/// Close an entry whose outcome is already decided.
async fn close_quietly(entry: Box<dyn CacheEntry>) {
    if let Err(e) = entry.close().await {
        warn!("Failed to close cache entry: {}", e);
    }
}

fn get_request(url: &str) -> Result<Request> {
    Ok(Request::new(Method::GET, Url::parse(url)?))
}
