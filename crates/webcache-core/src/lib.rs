//! Webcache Core - read-through/write-through caching for byte producers,
//! HTTP requests and JSON responses.
//!
//! A [`Cache`] is built from a [`CacheStore`] (where entries live) and an
//! [`HttpTransport`] (how live requests are made). Each call names the data
//! and the maximum age it accepts; stale or missing data is recomputed and
//! written back.
//!
//! # Example
//!
//! ```rust,ignore
//! use webcache_core::{Cache, FsStore, HttpClient, Ttl};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> webcache_core::Result<()> {
//!     let cache = Cache::new(FsStore::new("/var/cache/webcache"), HttpClient::new()?);
//!
//!     // Served from disk for an hour after the first fetch
//!     let body = cache
//!         .cache_url_data("https://example.com/feed.json", Ttl::MaxAge(Duration::from_secs(3600)))
//!         .await?;
//!     println!("{} bytes", body.len());
//!
//!     // Any async computation can be cached the same way
//!     let report = cache
//!         .cache_func("reports/daily", Ttl::Forever, || async {
//!             Ok::<_, std::io::Error>(b"expensive".to_vec())
//!         })
//!         .await?;
//!     assert_eq!(report, b"expensive");
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod network;
pub mod store;
pub mod ttl;

// Re-export commonly used types
pub use cache::{Cache, JSON_CONTENT_TYPES};
pub use config::ObjectStoreSettings;
pub use error::{BoxError, CacheError, Recovered, Result};
pub use http::{request_key, CachedResponse};
pub use network::{HttpClient, HttpTransport};
pub use store::{
    CacheEntry, CacheStore, FsStore, HttpObjectClient, MemoryObjectClient, ObjectClient,
    ObjectStore, RemoteObject,
};
pub use ttl::Ttl;
