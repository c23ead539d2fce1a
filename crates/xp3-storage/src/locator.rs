//! Resource locators
//!
//! A [`ResourceLocator`] says where a resource's bytes live:
//!
//! ```text
//! Filesystem: /abs/path/file.bin            [+ offset]
//! Archive:    /abs/path/data.xp3 :: entry   [+ offset]
//! ```
//!
//! Every locator derives a canonical id. Two locators describing the same
//! bytes produce the same id, which is what the resource cache keys on.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::trace;
use xp3_formats::ArchiveError;
use xp3_formats::archive::{normalize_path, preallocation};

use crate::archive_cache::ArchiveCache;
use crate::{Result, StorageError, absolute_path};

/// Where a resource's bytes live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceLocator {
    /// A plain file
    Filesystem {
        /// Absolute file path
        path: PathBuf,
        /// Bytes to skip at the start of the file
        offset: u64,
    },
    /// An entry inside an XP3 container
    Archive {
        /// Absolute container path
        archive_path: PathBuf,
        /// Normalized entry path inside the container
        entry_path: String,
        /// Bytes to skip at the start of the decoded entry
        offset: u64,
    },
}

impl ResourceLocator {
    /// Locate a plain file
    pub fn filesystem<P: AsRef<Path>>(path: P) -> Self {
        Self::Filesystem {
            path: absolute_path(path.as_ref()),
            offset: 0,
        }
    }

    /// Locate an entry inside a container
    pub fn archive<P: AsRef<Path>>(archive_path: P, entry_path: &str) -> Self {
        Self::Archive {
            archive_path: absolute_path(archive_path.as_ref()),
            entry_path: normalize_path(entry_path),
            offset: 0,
        }
    }

    /// Return the same locator with a different start offset
    #[must_use]
    pub fn with_offset(self, offset: u64) -> Self {
        match self {
            Self::Filesystem { path, .. } => Self::Filesystem { path, offset },
            Self::Archive {
                archive_path,
                entry_path,
                ..
            } => Self::Archive {
                archive_path,
                entry_path,
                offset,
            },
        }
    }

    /// Start offset
    pub fn offset(&self) -> u64 {
        match self {
            Self::Filesystem { offset, .. } | Self::Archive { offset, .. } => *offset,
        }
    }

    /// Canonical identifier used as the resource cache key
    ///
    /// `file://<path>?offset=<n>` for plain files and
    /// `file://<container>?query=<entry>&offset=<n>` for archive entries.
    pub fn id(&self) -> String {
        match self {
            Self::Filesystem { path, offset } => {
                format!("file://{}?offset={offset}", display_path(path))
            }
            Self::Archive {
                archive_path,
                entry_path,
                offset,
            } => format!(
                "file://{}?query={entry_path}&offset={offset}",
                display_path(archive_path)
            ),
        }
    }

    /// Whether the bytes this locator describes exist
    ///
    /// Missing files, containers and entries are `Ok(false)`. A container
    /// that exists but cannot be indexed is an error.
    pub fn exists(&self, archives: &ArchiveCache) -> Result<bool> {
        match self {
            Self::Filesystem { path, .. } => Ok(path.is_file()),
            Self::Archive {
                archive_path,
                entry_path,
                ..
            } => Ok(archives
                .archive_for(archive_path)?
                .is_some_and(|archive| archive.exists(entry_path))),
        }
    }

    /// Direct file access, available only for plain files
    pub fn file_info(&self) -> Option<FileInfo> {
        match self {
            Self::Filesystem { path, offset } => Some(FileInfo {
                path: path.clone(),
                offset: *offset,
            }),
            Self::Archive { .. } => None,
        }
    }

    /// Open a byte stream positioned at this locator's offset
    pub fn stream_info(&self, archives: &ArchiveCache) -> Result<StreamInfo> {
        match self {
            Self::Filesystem { path, offset } => {
                let file = File::open(path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => StorageError::NotFound(self.id()),
                    _ => StorageError::Io(e),
                })?;
                let len = file.metadata()?.len();
                let mut reader = BufReader::with_capacity(archives.read_buffer_size(), file);
                reader.seek(SeekFrom::Start(*offset))?;

                Ok(StreamInfo {
                    reader: Box::new(reader),
                    size_hint: len.saturating_sub(*offset),
                })
            }
            Self::Archive {
                archive_path,
                entry_path,
                offset,
            } => {
                let archive = archives
                    .archive_for(archive_path)?
                    .ok_or_else(|| StorageError::NotFound(self.id()))?;

                let (entry, mut stream) =
                    archive.extract_buffered(entry_path, archives.read_buffer_size())?;
                if archives.verify_checksums() {
                    stream = stream.with_checksum(entry.path.clone(), entry.hash);
                }

                // Decoded entries cannot seek, skip by reading through
                if *offset > 0 {
                    let skipped = io::copy(&mut stream.by_ref().take(*offset), &mut io::sink())
                        .map_err(ArchiveError::from_io)?;
                    trace!("Skipped {} bytes of {}", skipped, entry_path);
                }

                Ok(StreamInfo {
                    reader: Box::new(stream),
                    size_hint: entry.org_size.saturating_sub(*offset),
                })
            }
        }
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Direct access to a plain file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Absolute file path
    pub path: PathBuf,
    /// Bytes to skip at the start of the file
    pub offset: u64,
}

impl FileInfo {
    /// Open the file positioned at the offset
    pub fn open(&self) -> io::Result<File> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        Ok(file)
    }

    /// Read everything from the offset to the end of the file
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open()?.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// A forward-only byte stream plus the number of bytes it should yield
pub struct StreamInfo {
    /// Stream positioned at the locator's offset
    pub reader: Box<dyn Read + Send>,
    /// Expected number of bytes left in the stream
    pub size_hint: u64,
}

impl StreamInfo {
    /// Drain the stream
    ///
    /// Data errors raised inside an archive stream come back as
    /// [`StorageError::Archive`] rather than a bare I/O error.
    pub fn read_all(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(preallocation(self.size_hint));
        self.reader
            .read_to_end(&mut data)
            .map_err(|e| StorageError::Archive(ArchiveError::from_io(e)))?;
        Ok(data)
    }
}

impl fmt::Debug for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamInfo")
            .field("size_hint", &self.size_hint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use xp3_formats::{EncodeMethod, Xp3Builder};

    use crate::config::StorageConfig;

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let plain = dir.path().join("plain.bin");
        std::fs::write(&plain, b"0123456789").expect("Failed to write file");

        let container = dir.path().join("data.xp3");
        let mut builder = Xp3Builder::new();
        builder.add_split("dir/entry.txt", b"abcdefghij", 4, EncodeMethod::Zlib);
        builder
            .write_to_path(&container, EncodeMethod::Zlib)
            .expect("Failed to write container");

        (dir, plain, container)
    }

    #[test]
    fn test_ids_are_canonical() {
        let a = ResourceLocator::archive("/game/data.xp3", "image\\bg.png");
        let b = ResourceLocator::archive("/game/data.xp3", "image/bg.png");
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), "file:///game/data.xp3?query=image/bg.png&offset=0");

        let file = ResourceLocator::filesystem("/game/readme.txt").with_offset(16);
        assert_eq!(file.id(), "file:///game/readme.txt?offset=16");
        assert_ne!(file.id(), ResourceLocator::filesystem("/game/readme.txt").id());
    }

    #[test]
    fn test_filesystem_stream_and_file_info() {
        let (_dir, plain, _) = fixture();
        let archives = ArchiveCache::new();
        let locator = ResourceLocator::filesystem(&plain).with_offset(3);

        assert!(locator.exists(&archives).expect("exists"));
        let info = locator.file_info().expect("Plain files have file info");
        assert_eq!(info.read_all().expect("read"), b"3456789");

        let stream = locator.stream_info(&archives).expect("Failed to open stream");
        assert_eq!(stream.size_hint, 7);
        assert_eq!(stream.read_all().expect("read"), b"3456789");
    }

    #[test]
    fn test_archive_stream_skips_offset() {
        let (_dir, _, container) = fixture();
        let archives = ArchiveCache::new();
        let locator = ResourceLocator::archive(&container, "dir/entry.txt").with_offset(5);

        assert!(locator.file_info().is_none());
        assert!(locator.exists(&archives).expect("exists"));

        let stream = locator.stream_info(&archives).expect("Failed to open stream");
        assert_eq!(stream.size_hint, 5);
        assert_eq!(stream.read_all().expect("read"), b"fghij");
    }

    #[test]
    fn test_archive_stream_honours_buffer_size() {
        let (_dir, _, container) = fixture();
        let config = StorageConfig::default()
            .with_read_buffer_size(3)
            .with_verify_checksums(true);
        let archives = ArchiveCache::from_config(&config);
        assert_eq!(archives.read_buffer_size(), 3);

        let stream = ResourceLocator::archive(&container, "dir/entry.txt")
            .stream_info(&archives)
            .expect("Failed to open stream");
        assert_eq!(stream.read_all().expect("read"), b"abcdefghij");
    }

    #[test]
    fn test_missing_targets() {
        let (dir, _, container) = fixture();
        let archives = ArchiveCache::new();

        let missing_file = ResourceLocator::filesystem(dir.path().join("nope.bin"));
        assert!(!missing_file.exists(&archives).expect("exists"));
        let err = missing_file.stream_info(&archives).expect_err("missing file");
        assert!(err.is_not_found());

        let missing_entry = ResourceLocator::archive(&container, "nope.txt");
        assert!(!missing_entry.exists(&archives).expect("exists"));
        let err = missing_entry.stream_info(&archives).expect_err("missing entry");
        assert!(err.is_not_found());

        let missing_container = ResourceLocator::archive(dir.path().join("nope.xp3"), "a");
        assert!(!missing_container.exists(&archives).expect("exists"));
    }
}
