//! Filesystem store backed by exclusively locked files.
//!
//! Every open takes an fs2 advisory lock on the entry file and holds it until
//! the entry is closed or dropped, so the check/recompute/write sequence of
//! one caller never interleaves with another process (or another handle in
//! this process) using the same root.

use super::traits::{key_segments, CacheEntry, CacheStore};
use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::ttl::Ttl;
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Store that keeps each entry in a file under `root`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl CacheStore for FsStore {
    async fn open(&self, key: &str, ttl: Ttl) -> Result<Box<dyn CacheEntry>> {
        let path = self.entry_path(key)?;
        // Lock acquisition blocks until the current holder closes its entry.
        let entry = tokio::task::spawn_blocking(move || FsEntry::open_locked(path, ttl)).await??;
        debug!(
            "Opened {} (ttl {:?}, valid: {})",
            entry.path.display(),
            ttl,
            entry.valid
        );
        Ok(Box::new(entry))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io_with_path(e, path)),
        }
    }
}

/// A locked cache file.
#[derive(Debug)]
pub struct FsEntry {
    file: File,
    path: PathBuf,
    valid: bool,
    /// Set once the first write of the session has truncated the file.
    reset: bool,
}

impl FsEntry {
    fn open_locked(path: PathBuf, ttl: Ttl) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                message: format!("Failed to create cache directory {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        options.mode(StoreConfig::FILE_MODE);

        let file = options
            .open(&path)
            .map_err(|e| CacheError::io_with_path(e, &path))?;
        file.lock_exclusive().map_err(|e| CacheError::Io {
            message: format!("Failed to lock {}", path.display()),
            path: Some(path.clone()),
            source: Some(e),
        })?;

        // Dropping the entry on a metadata failure releases the lock.
        let mut entry = FsEntry {
            file,
            path,
            valid: false,
            reset: false,
        };
        entry.valid = entry.check_validity(ttl)?;
        Ok(entry)
    }

    fn check_validity(&self, ttl: Ttl) -> Result<bool> {
        if ttl == Ttl::Refresh {
            return Ok(false);
        }

        let metadata = self
            .file
            .metadata()
            .map_err(|e| CacheError::io_with_path(e, &self.path))?;
        // An empty file was created by this open (or by an aborted writer).
        if metadata.len() == 0 {
            return Ok(false);
        }
        if ttl == Ttl::Forever {
            return Ok(true);
        }

        let modified = metadata
            .modified()
            .map_err(|e| CacheError::io_with_path(e, &self.path))?;
        Ok(ttl.is_fresh(modified, SystemTime::now()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unlock(&self) -> io::Result<()> {
        FileExt::unlock(&self.file)
    }
}

#[async_trait]
impl CacheEntry for FsEntry {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.valid {
            return Err(CacheError::Expired);
        }
        self.file
            .read(buf)
            .map_err(|e| CacheError::io_with_path(e, &self.path))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.reset {
            self.file
                .seek(SeekFrom::Start(0))
                .and_then(|_| self.file.set_len(0))
                .map_err(|e| CacheError::Io {
                    message: format!("Error resetting cache file {}", self.path.display()),
                    path: Some(self.path.clone()),
                    source: Some(e),
                })?;
            self.reset = true;
        }
        self.file
            .write(data)
            .map_err(|e| CacheError::io_with_path(e, &self.path))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut entry = *self;
        entry
            .file
            .flush()
            .map_err(|e| CacheError::io_with_path(e, &entry.path))?;
        entry
            .unlock()
            .map_err(|e| CacheError::io_with_path(e, &entry.path))
    }
}

impl Drop for FsEntry {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well; unlock explicitly so
        // the release does not depend on the platform's close semantics.
        if let Err(e) = self.unlock() {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
