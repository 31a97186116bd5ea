//! Pluggable persistence for cache entries.
//!
//! Two backends share the [`CacheStore`]/[`CacheEntry`] contract:
//! - [`FsStore`]: files under a local root, serialized by advisory locks
//! - [`ObjectStore`]: gzip objects in a remote bucket, freshness by conditional fetch

mod fs;
mod object;
mod traits;

pub use fs::{FsEntry, FsStore};
pub use object::{
    format_http_date, parse_http_date, HttpObjectClient, MemoryObjectClient, ObjectClient,
    ObjectEntry, ObjectStore, RemoteObject,
};
pub use traits::{key_segments, CacheEntry, CacheStore};
