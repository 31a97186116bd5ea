//! Error types for the cache engine and its stores.
//!
//! Read-back failures (expired entries, unparseable cached responses, stale
//! JSON) are ordinary variants here; the engine classifies them with
//! [`CacheError::is_soft_miss`] and recomputes instead of surfacing them.

use crate::http::CachedResponse;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by caller-supplied producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for webcache.
#[derive(Debug, Error)]
pub enum CacheError {
    // Entry state
    #[error("Cache entry expired")]
    Expired,

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Object service error for {key} (status {status:?}): {message}")]
    ObjectService {
        key: String,
        status: Option<u16>,
        message: String,
    },

    // Payload errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Data is not JSON formatted (content-type {content_type:?})")]
    NotJson { content_type: String },

    #[error("Malformed cached response: {message}")]
    MalformedResponse { message: String },

    // Caller and runtime failures
    #[error("Producer failed: {0}")]
    Producer(#[source] BoxError),

    #[error("Failed to store fetched data: {source}")]
    WriteBack {
        recovered: Box<Recovered>,
        #[source]
        source: Box<CacheError>,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Data that was fetched or produced successfully but could not be persisted.
#[derive(Debug)]
pub enum Recovered {
    /// Raw bytes from a producer, or the JSON encoding of a produced value.
    Bytes(Vec<u8>),
    /// A live HTTP response.
    Response(CachedResponse),
}

/// Result type alias for webcache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err.to_string())
    }
}

impl CacheError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CacheError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap a failed write together with the data that should have been stored.
    pub fn write_back(source: CacheError, recovered: Recovered) -> Self {
        CacheError::WriteBack {
            recovered: Box::new(recovered),
            source: Box::new(source),
        }
    }

    /// Whether this error, raised while reading back a hit, only means the
    /// cached copy is unusable. The engine recomputes on these.
    pub fn is_soft_miss(&self) -> bool {
        matches!(
            self,
            CacheError::Expired | CacheError::MalformedResponse { .. } | CacheError::Json { .. }
        )
    }

    /// Data obtained before a [`CacheError::WriteBack`] failure.
    pub fn recovered(&self) -> Option<&Recovered> {
        match self {
            CacheError::WriteBack { recovered, .. } => Some(recovered),
            _ => None,
        }
    }

    /// Take ownership of the data carried by a [`CacheError::WriteBack`].
    pub fn into_recovered(self) -> Option<Recovered> {
        match self {
            CacheError::WriteBack { recovered, .. } => Some(*recovered),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::NotJson {
            content_type: "text/html".into(),
        };
        assert_eq!(
            err.to_string(),
            "Data is not JSON formatted (content-type \"text/html\")"
        );
        assert_eq!(CacheError::Expired.to_string(), "Cache entry expired");
    }

    #[test]
    fn test_soft_miss_classification() {
        assert!(CacheError::Expired.is_soft_miss());
        assert!(CacheError::MalformedResponse {
            message: "truncated".into()
        }
        .is_soft_miss());
        assert!(!CacheError::NotJson {
            content_type: "text/html".into()
        }
        .is_soft_miss());
        assert!(!CacheError::Task("panicked".into()).is_soft_miss());
    }

    #[test]
    fn test_write_back_carries_recovered_bytes() {
        let err = CacheError::write_back(
            CacheError::from(std::io::Error::other("disk full")),
            Recovered::Bytes(b"hi".to_vec()),
        );
        assert!(err.to_string().contains("disk full"));
        match err.into_recovered() {
            Some(Recovered::Bytes(data)) => assert_eq!(data, b"hi"),
            other => panic!("unexpected recovered data: {:?}", other),
        }
    }
}
