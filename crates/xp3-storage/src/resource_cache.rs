//! Cache of decoded resources keyed by canonical locator id
//!
//! Uses the same double-checked population as [`ArchiveCache`]: look up
//! under a read lock, decode outside any lock, insert under the write lock
//! unless another thread got there first.
//!
//! The cache is bidirectional. Besides locator id → resource it keeps
//! resource id → locator id, so a handle can be released without knowing
//! where it came from.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::archive_cache::ArchiveCache;
use crate::locator::ResourceLocator;
use crate::resource::{Loaded, Resource, ResourceDecoder, ResourceId, TypeDecoder};
use crate::{Result, StorageError};

/// Counters describing cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCacheStats {
    /// Loads answered from the cache
    pub hits: u64,
    /// Loads that had to decode
    pub misses: u64,
    /// Resources decoded successfully
    pub decodes: u64,
    /// Decoded resources dropped because another thread inserted first
    pub discarded: u64,
    /// Loads whose decode failed
    pub failures: u64,
}

struct Slot {
    resource: ResourceId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Slot {
    fn downcast<T: Send + Sync + 'static>(&self, source: &str) -> Result<Arc<Loaded<T>>> {
        Arc::clone(&self.value)
            .downcast::<Loaded<T>>()
            .map_err(|_| StorageError::TypeMismatch {
                id: source.to_string(),
                cached: self.type_name,
                requested: type_name::<T>(),
            })
    }
}

#[derive(Default)]
struct Entries {
    by_source: HashMap<String, Slot>,
    by_resource: HashMap<ResourceId, String>,
}

/// Cache of decoded resources
pub struct ResourceCache {
    archives: Arc<ArchiveCache>,
    entries: RwLock<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
    decodes: AtomicU64,
    discarded: AtomicU64,
    failures: AtomicU64,
}

impl ResourceCache {
    /// Create an empty cache reading containers through `archives`
    pub fn new(archives: Arc<ArchiveCache>) -> Self {
        Self {
            archives,
            entries: RwLock::new(Entries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            decodes: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Container cache used to open archive locators
    pub fn archives(&self) -> &Arc<ArchiveCache> {
        &self.archives
    }

    /// Load `T` from `locator` using its [`Resource`] implementation
    pub fn load<T: Resource>(&self, locator: &ResourceLocator) -> Result<Arc<Loaded<T>>> {
        self.load_with(locator, &TypeDecoder::<T>::new())
    }

    /// Load from `locator` with an explicit decoder
    ///
    /// Returns the cached instance when the locator id is already present.
    /// A failed decode is reported as [`StorageError::ResourceService`] and
    /// leaves the cache untouched.
    pub fn load_with<D: ResourceDecoder>(
        &self,
        locator: &ResourceLocator,
        decoder: &D,
    ) -> Result<Arc<Loaded<D::Output>>> {
        let source = locator.id();

        if let Some(slot) = self.entries.read().by_source.get(&source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Resource cache hit: {}", source);
            return slot.downcast(&source);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Decode without holding any lock
        let value = self.decode(locator, decoder).map_err(|e| {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to load {}: {}", source, e);
            StorageError::resource_service(source.clone(), e)
        })?;
        self.decodes.fetch_add(1, Ordering::Relaxed);
        let loaded = Arc::new(Loaded::new(source.clone(), value));

        let mut entries = self.entries.write();
        if let Some(existing) = entries.by_source.get(&source) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!("Discarding duplicate decode of {}", source);
            return existing.downcast(&source);
        }

        debug!("Cached resource {} as {}", source, loaded.resource_id());
        entries
            .by_resource
            .insert(loaded.resource_id(), source.clone());
        entries.by_source.insert(
            source,
            Slot {
                resource: loaded.resource_id(),
                type_name: type_name::<D::Output>(),
                value: Arc::clone(&loaded) as Arc<dyn Any + Send + Sync>,
            },
        );
        Ok(loaded)
    }

    /// Cached instance for `locator`, without decoding
    pub fn get<T: Send + Sync + 'static>(
        &self,
        locator: &ResourceLocator,
    ) -> Result<Option<Arc<Loaded<T>>>> {
        let source = locator.id();
        self.entries
            .read()
            .by_source
            .get(&source)
            .map(|slot| slot.downcast(&source))
            .transpose()
    }

    /// Whether a resource for `locator` is cached
    pub fn contains(&self, locator: &ResourceLocator) -> bool {
        self.entries.read().by_source.contains_key(&locator.id())
    }

    /// Stop tracking the resource behind `handle`
    ///
    /// Outstanding handles stay valid. The next load of the same locator
    /// decodes a new instance.
    pub fn release<T>(&self, handle: &Loaded<T>) -> bool {
        self.release_id(handle.resource_id())
    }

    /// Stop tracking the resource with id `resource`
    pub fn release_id(&self, resource: ResourceId) -> bool {
        let mut entries = self.entries.write();
        let Some(source) = entries.by_resource.remove(&resource) else {
            return false;
        };

        if entries
            .by_source
            .get(&source)
            .is_some_and(|slot| slot.resource == resource)
        {
            entries.by_source.remove(&source);
        }
        debug!("Released resource {} ({})", resource, source);
        true
    }

    /// Stop tracking whatever is cached for `locator`
    pub fn evict(&self, locator: &ResourceLocator) -> bool {
        let mut entries = self.entries.write();
        match entries.by_source.remove(&locator.id()) {
            Some(slot) => {
                entries.by_resource.remove(&slot.resource);
                true
            }
            None => false,
        }
    }

    /// Number of cached resources
    pub fn len(&self) -> usize {
        self.entries.read().by_source.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().by_source.is_empty()
    }

    /// Drop every cached resource
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!("Clearing {} cached resources", entries.by_source.len());
        entries.by_source.clear();
        entries.by_resource.clear();
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> ResourceCacheStats {
        ResourceCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn decode<D: ResourceDecoder>(
        &self,
        locator: &ResourceLocator,
        decoder: &D,
    ) -> Result<D::Output> {
        if let Some(file) = locator.file_info()
            && let Some(value) = decoder.decode_file(&file)?
        {
            return Ok(value);
        }

        let stream = locator.stream_info(&self.archives)?;
        decoder.decode_stream(stream)
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
