//! S3-compatible object client over plain HTTP.
//!
//! Requests are unsigned, which suits public buckets, presigning proxies and
//! S3-compatible gateways that authorize by network.

use super::client::{ObjectClient, RemoteObject};
use crate::config::{NetworkConfig, ObjectStoreSettings};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use tracing::debug;

/// IMF-fixdate, as used by `If-Modified-Since` and `Last-Modified`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// [`ObjectClient`] speaking the S3 REST object API through reqwest.
#[derive(Debug, Clone)]
pub struct HttpObjectClient {
    client: Client,
    base_url: String,
}

impl HttpObjectClient {
    /// Build a client for the endpoint described by `settings`.
    ///
    /// The bucket is part of the base URL, so the `bucket` arguments of the
    /// [`ObjectClient`] methods are only used for error context.
    pub fn new(settings: &ObjectStoreSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| CacheError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;
        Ok(Self::with_client(client, settings))
    }

    /// Use an existing reqwest client.
    pub fn with_client(client: Client, settings: &ObjectStoreSettings) -> Self {
        Self {
            client,
            base_url: settings.object_base_url(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn service_error(response: Response, bucket: &str, key: &str) -> CacheError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        CacheError::ObjectService {
            key: format!("{}/{}", bucket, key),
            status: Some(status.as_u16()),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        }
    }
}

/// Format a timestamp as an HTTP date.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP date header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl ObjectClient for HttpObjectClient {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<Option<RemoteObject>> {
        let mut request = self.client.get(self.object_url(key));
        if let Some(since) = if_modified_since {
            request = request.header(header::IF_MODIFIED_SINCE, format_http_date(since));
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_MODIFIED | StatusCode::NOT_FOUND => {
                debug!("No object for {}/{} ({})", bucket, key, response.status());
                Ok(None)
            }
            status if status.is_success() => {
                let headers = response.headers();
                let content_encoding = headers
                    .get(header::CONTENT_ENCODING)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string());
                let last_modified = headers
                    .get(header::LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_http_date);
                let body = response.bytes().await?;
                Ok(Some(RemoteObject {
                    body,
                    content_encoding,
                    last_modified,
                }))
            }
            _ => Err(Self::service_error(response, bucket, key).await),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_encoding: &str,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .header(header::CONTENT_ENCODING, content_encoding)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        if response.status().is_success() {
            debug!("Uploaded {}/{}", bucket, key);
            Ok(())
        } else {
            Err(Self::service_error(response, bucket, key).await)
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let response = self.client.delete(self.object_url(key)).send().await?;
        // S3 answers 204 for both existing and missing keys; gateways may 404.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::service_error(response, bucket, key).await)
        }
    }
}
