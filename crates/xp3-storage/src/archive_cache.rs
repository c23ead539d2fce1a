//! Shared cache of parsed XP3 containers
//!
//! Each container path is parsed at most once per cache (modulo races).
//! Lookups take a read lock; a miss parses outside any lock and then inserts
//! under the write lock. When two threads miss on the same path, both parse
//! and the first insert wins: the loser's handle is dropped and it returns
//! the winner's.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};
use xp3_formats::Xp3Archive;

use crate::config::StorageConfig;
use crate::{Result, absolute_path};

/// Counters describing cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveCacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to consult the filesystem
    pub misses: u64,
    /// Containers parsed successfully
    pub parses: u64,
    /// Parsed handles dropped because another thread inserted first
    pub discarded: u64,
}

/// Cache mapping absolute container paths to shared parsed handles
#[derive(Debug)]
pub struct ArchiveCache {
    archives: RwLock<HashMap<PathBuf, Arc<Xp3Archive>>>,
    verify_checksums: bool,
    read_buffer_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    parses: AtomicU64,
    discarded: AtomicU64,
}

impl Default for ArchiveCache {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

impl ArchiveCache {
    /// Create an empty cache with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache using the stream settings of `config`
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            archives: RwLock::new(HashMap::new()),
            verify_checksums: config.verify_checksums,
            read_buffer_size: config.read_buffer_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            parses: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Whether entry streams opened through this cache check `adlr` checksums
    pub fn verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    /// Buffer size for file-backed readers
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Get the parsed container at `path`
    ///
    /// Returns `Ok(None)` if no regular file exists there. A file that exists
    /// but is not a valid container is an error and is not cached, so a
    /// later call parses it again.
    pub fn archive_for<P: AsRef<Path>>(&self, path: P) -> Result<Option<Arc<Xp3Archive>>> {
        let key = absolute_path(path.as_ref());

        if let Some(archive) = self.archives.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(Arc::clone(archive)));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        if !key.is_file() {
            debug!("No container at {:?}", key);
            return Ok(None);
        }

        // Parse without holding any lock
        let parsed = Arc::new(Xp3Archive::open(&key)?);
        self.parses.fetch_add(1, Ordering::Relaxed);

        match self.archives.write().entry(key) {
            Entry::Occupied(existing) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding duplicate parse of {:?}", existing.key());
                Ok(Some(Arc::clone(existing.get())))
            }
            Entry::Vacant(slot) => {
                info!(
                    "Cached container {:?} ({} entries)",
                    slot.key(),
                    parsed.len()
                );
                slot.insert(Arc::clone(&parsed));
                Ok(Some(parsed))
            }
        }
    }

    /// Whether `path` is already cached
    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.archives
            .read()
            .contains_key(&absolute_path(path.as_ref()))
    }

    /// Number of cached containers
    pub fn len(&self) -> usize {
        self.archives.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.archives.read().is_empty()
    }

    /// Drop every cached handle
    ///
    /// Handles already given out stay valid.
    pub fn clear(&self) {
        let mut archives = self.archives.write();
        debug!("Clearing {} cached containers", archives.len());
        archives.clear();
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> ArchiveCacheStats {
        ArchiveCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            parses: self.parses.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
