//! HTTP transport used by the cache engine.
//!
//! The engine performs exactly one `execute` per live fetch and never
//! retries; timeouts are the transport's business.

use crate::config::NetworkConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use std::time::Duration;
use tracing::debug;

/// Performs one HTTP exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl HttpTransport for Client {
    async fn execute(&self, request: Request) -> Result<Response> {
        Ok(Client::execute(self, request).await?)
    }
}

/// reqwest client configured with the crate's timeout and user agent.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| CacheError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;
        Ok(Self { client, timeout })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let domain = extract_domain(request.url().as_str());
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| CacheError::Network {
                message: format!("{} {} failed: {}", method, domain, e),
                source: Some(e),
            })?;
        debug!("{} {} -> {}", method, domain, response.status());
        Ok(response)
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
