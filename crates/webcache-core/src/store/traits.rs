//! Store and entry traits shared by every backend.

use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::ttl::Ttl;
use async_trait::async_trait;

/// One open cache slot.
///
/// Validity is decided when the store opens the entry and never changes
/// afterwards. The first `write` of a session replaces whatever the slot held;
/// later writes append. `close` publishes pending writes and releases the
/// slot; dropping an entry without closing still releases locks and handles.
#[async_trait]
pub trait CacheEntry: Send {
    /// Whether the slot held usable data at open time.
    fn is_valid(&self) -> bool;

    /// Read cached bytes. Fails with [`CacheError::Expired`] on an invalid entry.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes into the slot.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush pending writes and release the slot.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Drain the entry.
    fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; StoreConfig::READ_CHUNK_SIZE];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&buf[..n]);
        }
    }

    /// Write all of `data`. Empty data still replaces the slot's content.
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        if data.is_empty() {
            self.write(data)?;
            return Ok(());
        }
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
            }
            data = &data[n..];
        }
        Ok(())
    }
}

/// Pluggable persistence for cache entries.
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open the slot for `key`, deciding its validity under `ttl`.
    async fn open(&self, key: &str, ttl: Ttl) -> Result<Box<dyn CacheEntry>>;

    /// Remove the slot for `key`.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Check that `key` is a relative, `/`-separated path with no `.` or `..`
/// segments, and return its segments.
pub fn key_segments(key: &str) -> Result<Vec<&str>> {
    let invalid = |reason: &str| CacheError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(invalid("key must be a relative '/'-separated path"));
    }

    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments {
        match *segment {
            "" => return Err(invalid("key contains an empty segment")),
            "." | ".." => return Err(invalid("key contains a relative segment")),
            _ => {}
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SliceEntry {
        data: Vec<u8>,
        pos: usize,
        written: Vec<u8>,
    }

    #[async_trait]
    impl CacheEntry for SliceEntry {
        fn is_valid(&self) -> bool {
            true
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            // Hand out at most 3 bytes per call to exercise the drain loop.
            let n = buf.len().min(3).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            let n = data.len().min(2);
            self.written.extend_from_slice(&data[..n]);
            Ok(n)
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_to_end_and_write_all_loop() {
        let mut entry = SliceEntry {
            data: b"hello world".to_vec(),
            pos: 0,
            written: Vec::new(),
        };
        assert_eq!(entry.read_to_end().unwrap(), b"hello world");

        entry.write_all(b"abcde").unwrap();
        assert_eq!(entry.written, b"abcde");
    }

    #[test]
    fn test_write_all_empty_still_writes() {
        struct CountingEntry {
            writes: usize,
        }

        #[async_trait]
        impl CacheEntry for CountingEntry {
            fn is_valid(&self) -> bool {
                false
            }

            fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
                Err(CacheError::Expired)
            }

            fn write(&mut self, data: &[u8]) -> Result<usize> {
                self.writes += 1;
                Ok(data.len())
            }

            async fn close(self: Box<Self>) -> Result<()> {
                Ok(())
            }
        }

        let mut entry = CountingEntry { writes: 0 };
        entry.write_all(b"").unwrap();
        assert_eq!(entry.writes, 1);
    }

    #[test]
    fn test_key_segments() {
        assert_eq!(key_segments("a/b/c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(key_segments("single").unwrap(), vec!["single"]);

        for bad in ["", "/abs", "a//b", "a/../b", "./a", "a/", "a\\b"] {
            assert!(
                matches!(key_segments(bad), Err(CacheError::InvalidKey { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }
}
