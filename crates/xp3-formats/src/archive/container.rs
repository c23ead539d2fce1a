//! Parsed XP3 container
//!
//! The index is read once at open time and never mutated afterwards, so an
//! `Xp3Archive` can be shared freely between threads. Content is read through
//! [`SegmentStream`]s, each over its own file handle.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use binrw::BinReaderExt;
use flate2::read::ZlibDecoder;
use tracing::{debug, info};

use super::error::{ArchiveError, ArchiveResult};
use super::header::{IndexHeader, Xp3Header};
use super::index::{EncodeMethod, IndexEntry, normalize_path, parse_index};
use super::stream::SegmentStream;

/// Upper bound on a decompressed index (256 MB)
///
/// Guards against an index header declaring an absurd size before any
/// allocation happens.
pub const MAX_INDEX_SIZE: u64 = 256 * 1024 * 1024;

/// Largest buffer reserved up front from a size the index declares (16 MB)
///
/// Reads of larger entries grow the buffer as data actually arrives.
pub const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// Buffer size of entry streams opened by [`Xp3Archive::extract`]
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Stream type returned by [`Xp3Archive::extract`]
pub type EntryStream = SegmentStream<BufReader<File>>;

/// One parsed container file
#[derive(Debug, Clone)]
pub struct Xp3Archive {
    path: PathBuf,
    entries: Vec<IndexEntry>,
    lookup: HashMap<String, usize>,
}

impl Xp3Archive {
    /// Open and index the container at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        let path = path.as_ref();
        info!("Opening XP3 archive {}", path.display());
        let mut reader = BufReader::new(File::open(path)?);
        Self::parse(&mut reader, path)
    }

    /// Index a container read from `reader`
    ///
    /// `path` is recorded as the file later streams are opened from.
    pub fn parse<R: Read + Seek, P: AsRef<Path>>(reader: &mut R, path: P) -> ArchiveResult<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header: Xp3Header = reader.read_le()?;
        header.validate()?;

        reader.seek(SeekFrom::Start(header.index_offset))?;
        let index_header: IndexHeader = reader.read_le()?;
        debug!(
            "XP3 index at {}: {:?}, {} stored bytes, {} index bytes",
            header.index_offset,
            index_header.encoding,
            index_header.stored_size,
            index_header.index_size
        );

        if index_header.index_size > MAX_INDEX_SIZE {
            return Err(ArchiveError::invalid_index(format!(
                "index size {} exceeds limit of {} bytes",
                index_header.index_size, MAX_INDEX_SIZE
            )));
        }

        let data = read_index_content(reader, &index_header)?;
        let entries = parse_index(&data)?;
        check_segment_bounds(&entries, file_len)?;
        let lookup = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.path.clone(), i))
            .collect();

        debug!("Indexed {} entries", entries.len());

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            entries,
            lookup,
        })
    }

    /// Filesystem path of the container
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `entry_path` is in the index
    pub fn exists(&self, entry_path: &str) -> bool {
        self.lookup.contains_key(&normalize_path(entry_path))
    }

    /// Metadata of `entry_path`, if indexed
    pub fn entry(&self, entry_path: &str) -> Option<&IndexEntry> {
        self.lookup
            .get(&normalize_path(entry_path))
            .map(|&i| &self.entries[i])
    }

    /// All entries in index order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Snapshot of all entry paths in index order (not sorted)
    pub fn list_files(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.path.clone()).collect()
    }

    /// Open a decompressing stream over `entry_path`
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::InvalidPath`] if `entry_path` is not relative
    /// - [`ArchiveError::EntryNotFound`] if it is not in the index
    pub fn extract(&self, entry_path: &str) -> ArchiveResult<(IndexEntry, EntryStream)> {
        self.extract_buffered(entry_path, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Like [`extract`](Self::extract), reading the container through a
    /// buffer of `buffer_size` bytes
    pub fn extract_buffered(
        &self,
        entry_path: &str,
        buffer_size: usize,
    ) -> ArchiveResult<(IndexEntry, EntryStream)> {
        let entry = self.lookup_entry(entry_path)?;
        let file = BufReader::with_capacity(buffer_size, File::open(&self.path)?);
        Ok((entry.clone(), SegmentStream::for_entry(file, entry)))
    }

    /// Like [`extract`](Self::extract), verifying the `adlr` checksum at end of stream
    pub fn extract_verified(&self, entry_path: &str) -> ArchiveResult<(IndexEntry, EntryStream)> {
        let (entry, stream) = self.extract(entry_path)?;
        let stream = stream.with_checksum(entry.path.clone(), entry.hash);
        Ok((entry, stream))
    }

    /// Read a whole entry into memory
    pub fn read(&self, entry_path: &str) -> ArchiveResult<Vec<u8>> {
        let (entry, mut stream) = self.extract(entry_path)?;
        let mut data = Vec::with_capacity(preallocation(entry.org_size));
        stream
            .read_to_end(&mut data)
            .map_err(ArchiveError::from_io)?;
        Ok(data)
    }

    /// Read `entry_path` fully and check it against its `adlr` checksum
    pub fn verify(&self, entry_path: &str) -> ArchiveResult<()> {
        let (_, mut stream) = self.extract_verified(entry_path)?;
        std::io::copy(&mut stream, &mut std::io::sink()).map_err(ArchiveError::from_io)?;
        Ok(())
    }

    /// Verify every entry, returning the paths that failed with their errors
    pub fn verify_all(&self) -> Vec<(String, ArchiveError)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                self.verify(&entry.path)
                    .err()
                    .map(|err| (entry.path.clone(), err))
            })
            .collect()
    }

    fn lookup_entry(&self, entry_path: &str) -> ArchiveResult<&IndexEntry> {
        let normalized = validate_entry_path(entry_path)?;
        self.lookup
            .get(&normalized)
            .map(|&i| &self.entries[i])
            .ok_or(ArchiveError::EntryNotFound(normalized))
    }
}

/// Buffer capacity to reserve for `declared` bytes, capped at [`MAX_PREALLOCATION`]
pub fn preallocation(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOCATION)).unwrap_or(0)
}

/// Reject segments whose stored bytes lie outside a file of `file_len` bytes
fn check_segment_bounds(entries: &[IndexEntry], file_len: u64) -> ArchiveResult<()> {
    for entry in entries {
        for segment in &entry.segments {
            let end = segment.start.checked_add(segment.arc_size);
            if end.is_none_or(|end| end > file_len) {
                return Err(ArchiveError::invalid_index(format!(
                    "entry {}: segment at {} ({} bytes) lies past end of file ({file_len} bytes)",
                    entry.path, segment.start, segment.arc_size
                )));
            }
        }
    }
    Ok(())
}

/// Normalize a query path and reject anything that is not a plain relative path
pub fn validate_entry_path(entry_path: &str) -> ArchiveResult<String> {
    let normalized = normalize_path(entry_path);
    // Rooted or drive-prefixed (`C:`) paths are rejected on every host
    let drive_prefixed = normalized.as_bytes().get(1) == Some(&b':');
    if normalized.is_empty() || normalized.starts_with('/') || drive_prefixed {
        return Err(ArchiveError::InvalidPath(entry_path.to_string()));
    }

    let relative = Path::new(&normalized)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !relative || normalized.split('/').any(|part| part == "..") {
        return Err(ArchiveError::InvalidPath(entry_path.to_string()));
    }

    Ok(normalized)
}

fn read_index_content<R: Read + Seek>(
    reader: &mut R,
    header: &IndexHeader,
) -> ArchiveResult<Vec<u8>> {
    let expected = header.index_size as usize;
    let mut data = Vec::with_capacity(preallocation(header.index_size));

    let read = match header.encoding {
        EncodeMethod::Raw => reader.by_ref().take(header.stored_size).read_to_end(&mut data)?,
        EncodeMethod::Zlib => {
            // One byte past the declared size is enough to detect overlong output
            let stored = reader.by_ref().take(header.stored_size);
            ZlibDecoder::new(stored)
                .take(header.index_size + 1)
                .read_to_end(&mut data)
                .map_err(|e| ArchiveError::invalid_index(format!("index decompression failed: {e}")))?
        }
    };

    if read != expected {
        return Err(ArchiveError::invalid_index(format!(
            "index holds {read} bytes, header declares {expected}"
        )));
    }
    Ok(data)
}
