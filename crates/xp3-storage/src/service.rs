//! Resource service composing the container and resource caches

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::archive_cache::ArchiveCache;
use crate::config::StorageConfig;
use crate::locator::{ResourceLocator, StreamInfo};
use crate::resource::{Loaded, Resource, ResourceDecoder};
use crate::resource_cache::ResourceCache;
use crate::{Result, StorageError, absolute_path};

/// Entry point for locating and loading resources
///
/// Owns one [`ArchiveCache`] and one [`ResourceCache`] sharing it. Several
/// services can coexist; nothing is process-global.
#[derive(Debug)]
pub struct ResourceService {
    config: StorageConfig,
    archives: Arc<ArchiveCache>,
    resources: ResourceCache,
}

impl ResourceService {
    /// Create a service with empty caches
    pub fn new(config: StorageConfig) -> Self {
        let archives = Arc::new(ArchiveCache::from_config(&config));
        info!(
            "Resource service rooted at {:?} (verify checksums: {})",
            config.root, config.verify_checksums
        );
        Self {
            resources: ResourceCache::new(Arc::clone(&archives)),
            archives,
            config,
        }
    }

    /// Create a service after validating `config`
    pub fn try_new(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Active configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Container cache
    pub fn archives(&self) -> &Arc<ArchiveCache> {
        &self.archives
    }

    /// Decoded resource cache
    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    /// Resolve a virtual path to a locator
    ///
    /// Relative paths resolve against the configured root. A path naming a
    /// regular file gives a filesystem locator. Otherwise the closest
    /// ancestor that is a regular file is opened as a container and the
    /// rest of the path is looked up inside it, so `data.xp3/image/bg.png`
    /// names the entry `image/bg.png` of `data.xp3`. An ancestor that does
    /// not parse as a container ends the search with
    /// [`StorageError::NotFound`].
    pub fn locate<P: AsRef<Path>>(&self, path: P) -> Result<ResourceLocator> {
        let full = absolute_path(&self.config.root.join(path.as_ref()));
        if full.is_file() {
            return Ok(ResourceLocator::filesystem(&full));
        }

        for container in full.ancestors().skip(1) {
            if !container.is_file() {
                continue;
            }
            let archive = match self.archives.archive_for(container) {
                Ok(Some(archive)) => archive,
                Ok(None) => continue,
                // A plain file ancestor cannot hold the rest of the path
                Err(e) if e.is_format_error() => {
                    debug!("{:?} is not a container: {}", container, e);
                    break;
                }
                Err(e) => return Err(e),
            };
            let Ok(rest) = full.strip_prefix(container) else {
                continue;
            };

            let entry = rest
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if archive.exists(&entry) {
                debug!("Located {:?} in container {:?}", entry, container);
                return Ok(ResourceLocator::archive(container, &entry));
            }
            break;
        }

        Err(StorageError::NotFound(full.display().to_string()))
    }

    /// Whether `locator` names existing bytes
    pub fn exists(&self, locator: &ResourceLocator) -> Result<bool> {
        locator.exists(&self.archives)
    }

    /// Open the raw byte stream behind `locator`, bypassing the resource cache
    pub fn open(&self, locator: &ResourceLocator) -> Result<StreamInfo> {
        locator.stream_info(&self.archives)
    }

    /// Load `T` from `locator`
    pub fn load<T: Resource>(&self, locator: &ResourceLocator) -> Result<Arc<Loaded<T>>> {
        self.resources.load(locator)
    }

    /// Load from `locator` with an explicit decoder
    pub fn load_with<D: ResourceDecoder>(
        &self,
        locator: &ResourceLocator,
        decoder: &D,
    ) -> Result<Arc<Loaded<D::Output>>> {
        self.resources.load_with(locator, decoder)
    }

    /// Stop tracking the resource behind `handle`
    pub fn release<T>(&self, handle: &Loaded<T>) -> bool {
        self.resources.release(handle)
    }
}
