//! XP3 container builder
//!
//! Writes a container in a single pass:
//!
//! ```text
//! [header: magic + index offset][segment 0][segment 1]...[index header][index]
//! ```
//!
//! The header is written first with a zero index offset and patched once the
//! index position is known, so the writer must support seeking.
//!
//! # Example
//!
//! ```rust,no_run
//! use xp3_formats::archive::{EncodeMethod, Xp3Builder};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = Xp3Builder::new();
//! builder.add_file("startup.tjs", b"// script", EncodeMethod::Zlib);
//! builder.add_split("bgm/title.ogg", &[0u8; 4096], 1024, EncodeMethod::Raw);
//! builder.write_to_path("data.xp3", EncodeMethod::Zlib)?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use binrw::BinWriterExt;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use tracing::debug;

use super::error::ArchiveResult;
use super::header::{ChunkHeader, HEADER_SIZE, IndexHeader, Xp3Header};
use super::index::{
    CHUNK_ADLR, CHUNK_FILE, CHUNK_INFO, CHUNK_SEGM, CHUNK_TIME, EncodeMethod, IndexEntry,
    InfoRecord, Segment, SegmentRecord, normalize_path,
};
use crate::adler32::Adler32;

/// Entry queued for writing
#[derive(Debug, Clone)]
struct PendingFile {
    path: String,
    flags: u32,
    timestamp: Option<u64>,
    parts: Vec<(EncodeMethod, Vec<u8>)>,
}

/// Builder for XP3 containers
#[derive(Debug, Clone, Default)]
pub struct Xp3Builder {
    files: Vec<PendingFile>,
    compression: Compression,
}

impl Xp3Builder {
    /// Create an empty builder using the default zlib level
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the zlib level used for ZLIB segments and a ZLIB index
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Add an entry stored as one segment
    pub fn add_file(&mut self, path: &str, data: &[u8], encoding: EncodeMethod) -> &mut Self {
        self.add_segments(path, vec![(encoding, data.to_vec())])
    }

    /// Add an entry cut into segments of at most `segment_size` bytes
    pub fn add_split(
        &mut self,
        path: &str,
        data: &[u8],
        segment_size: usize,
        encoding: EncodeMethod,
    ) -> &mut Self {
        let parts = if data.is_empty() {
            vec![(encoding, Vec::new())]
        } else {
            data.chunks(segment_size.max(1))
                .map(|chunk| (encoding, chunk.to_vec()))
                .collect()
        };
        self.add_segments(path, parts)
    }

    /// Add an entry from explicit segment contents and encodings
    pub fn add_segments(&mut self, path: &str, parts: Vec<(EncodeMethod, Vec<u8>)>) -> &mut Self {
        self.files.push(PendingFile {
            path: normalize_path(path),
            flags: 0,
            timestamp: None,
            parts,
        });
        self
    }

    /// Set the `info` flag word of the most recently added entry
    pub fn flags(&mut self, flags: u32) -> &mut Self {
        if let Some(file) = self.files.last_mut() {
            file.flags = flags;
        }
        self
    }

    /// Attach a `time` chunk to the most recently added entry
    pub fn timestamp(&mut self, timestamp: u64) -> &mut Self {
        if let Some(file) = self.files.last_mut() {
            file.timestamp = Some(timestamp);
        }
        self
    }

    /// Write the container, returning the index entries as written
    pub fn build<W: Write + Seek>(
        &self,
        writer: &mut W,
        index_encoding: EncodeMethod,
    ) -> ArchiveResult<Vec<IndexEntry>> {
        let base = writer.stream_position()?;
        writer.write_le(&Xp3Header::new(0))?;

        let mut position = base + HEADER_SIZE;
        let mut entries = Vec::with_capacity(self.files.len());

        for file in &self.files {
            let mut segments = Vec::with_capacity(file.parts.len());
            let mut hasher = Adler32::new();

            for (encoding, data) in &file.parts {
                let stored = match encoding {
                    EncodeMethod::Raw => data.clone(),
                    EncodeMethod::Zlib => self.deflate(data)?,
                };
                writer.write_all(&stored)?;
                hasher.update(data);

                // Offsets are relative to the start of the container
                segments.push(Segment {
                    encoding: *encoding,
                    start: position - base,
                    org_size: data.len() as u64,
                    arc_size: stored.len() as u64,
                });
                position += stored.len() as u64;
            }

            entries.push(IndexEntry {
                path: file.path.clone(),
                flags: file.flags,
                org_size: segments.iter().map(|s| s.org_size).sum(),
                arc_size: segments.iter().map(|s| s.arc_size).sum(),
                hash: hasher.finish(),
                timestamp: file.timestamp,
                segments,
            });
        }

        let index = encode_index(&entries)?;
        let index_offset = position - base;
        let index_header = match index_encoding {
            EncodeMethod::Raw => {
                let header = IndexHeader::raw(index.len() as u64);
                writer.write_le(&header)?;
                writer.write_all(&index)?;
                header
            }
            EncodeMethod::Zlib => {
                let compressed = self.deflate(&index)?;
                let header = IndexHeader::zlib(compressed.len() as u64, index.len() as u64);
                writer.write_le(&header)?;
                writer.write_all(&compressed)?;
                header
            }
        };
        let end = writer.stream_position()?;

        writer.seek(SeekFrom::Start(base))?;
        writer.write_le(&Xp3Header::new(index_offset))?;
        writer.seek(SeekFrom::Start(end))?;
        writer.flush()?;

        debug!(
            "Wrote XP3 container: {} entries, index at {} ({:?}, {} bytes)",
            entries.len(),
            index_offset,
            index_header.encoding,
            index_header.stored_size
        );
        Ok(entries)
    }

    /// Write the container to a new file at `path`
    pub fn write_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        index_encoding: EncodeMethod,
    ) -> ArchiveResult<Vec<IndexEntry>> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.build(&mut writer, index_encoding)
    }

    fn deflate(&self, data: &[u8]) -> ArchiveResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }
}

/// Serialize entries into index chunks
fn encode_index(entries: &[IndexEntry]) -> ArchiveResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());

    for entry in entries {
        let info = InfoRecord::new(entry.flags, entry.org_size, entry.arc_size, &entry.path)?;
        let segm_size = Segment::RECORD_SIZE * entry.segments.len() as u64;
        let time_size = entry.timestamp.map_or(0, |_| ChunkHeader::SIZE + 8);
        let nested = (ChunkHeader::SIZE + info.encoded_size())
            + (ChunkHeader::SIZE + segm_size)
            + time_size
            + (ChunkHeader::SIZE + 4);

        write_chunk_header(&mut out, CHUNK_FILE, nested)?;

        write_chunk_header(&mut out, CHUNK_INFO, info.encoded_size())?;
        out.write_le(&info)?;

        write_chunk_header(&mut out, CHUNK_SEGM, segm_size)?;
        for segment in &entry.segments {
            out.write_le(&SegmentRecord::from(segment))?;
        }

        if let Some(timestamp) = entry.timestamp {
            write_chunk_header(&mut out, CHUNK_TIME, 8)?;
            out.write_le(&timestamp)?;
        }

        write_chunk_header(&mut out, CHUNK_ADLR, 4)?;
        out.write_le(&entry.hash)?;
    }

    Ok(out.into_inner())
}

fn write_chunk_header<W: Write + Seek>(
    writer: &mut W,
    tag: [u8; 4],
    size: u64,
) -> ArchiveResult<()> {
    writer.write_le(&ChunkHeader { tag, size })?;
    Ok(())
}
