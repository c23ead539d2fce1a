//! Index chunk records and the chunk-walking index parser
//!
//! The decompressed index is a flat sequence of chunks. Each entry is
//! opened by a `File` chunk, described by `info` and `segm` (and optionally
//! `time`), and committed by `adlr`:
//!
//! ```text
//! File <len>
//!   info <len> flag:u32 org:u64 arc:u64 name_len:u16 name:utf16[name_len]
//!   segm <len> { flags:u32 start:u64 org:u64 arc:u64 } * n
//!   time <len> timestamp:u64              (optional)
//!   adlr <len> hash:u32                   (commits the entry)
//! File ...
//! ```
//!
//! The length of a `File` chunk covers its nested chunks. The parser walks
//! into it rather than skipping it, so a zero length is accepted as well.

use binrw::io::Cursor;
use binrw::{BinRead, BinReaderExt, BinWrite};
use tracing::{trace, warn};

use super::error::{ArchiveError, ArchiveResult};
use super::header::ChunkHeader;

/// Chunk tag opening a new entry
pub const CHUNK_FILE: [u8; 4] = *b"File";
/// Chunk tag carrying entry metadata and name
pub const CHUNK_INFO: [u8; 4] = *b"info";
/// Chunk tag carrying the segment table
pub const CHUNK_SEGM: [u8; 4] = *b"segm";
/// Chunk tag carrying the Adler-32 checksum; commits the entry
pub const CHUNK_ADLR: [u8; 4] = *b"adlr";
/// Chunk tag carrying the entry timestamp
pub const CHUNK_TIME: [u8; 4] = *b"time";

/// `info` flag bit marking an entry as protected
pub const FLAG_PROTECTED: u32 = 0x8000_0000;

/// Mask selecting the encode method from a flag word
const ENCODE_METHOD_MASK: u32 = 0x07;

/// Storage encoding of the index or of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeMethod {
    /// Stored as-is
    Raw,
    /// Stored as a zlib stream
    Zlib,
}

impl EncodeMethod {
    /// Decode the method from the low three bits of a flag word
    pub fn from_flags(flags: u32) -> ArchiveResult<Self> {
        match flags & ENCODE_METHOD_MASK {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Zlib),
            other => Err(ArchiveError::UnsupportedEncoding(other)),
        }
    }

    /// Flag word value for this method (reserved bits clear)
    pub fn as_flags(self) -> u32 {
        match self {
            Self::Raw => 0,
            Self::Zlib => 1,
        }
    }
}

/// One contiguous byte range of the container backing part of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// How the range is encoded
    pub encoding: EncodeMethod,
    /// Absolute offset of the range in the container file
    pub start: u64,
    /// Decompressed bytes this segment contributes
    pub org_size: u64,
    /// Stored bytes of this segment
    pub arc_size: u64,
}

impl Segment {
    /// Encoded size of one segment record in a `segm` chunk
    pub const RECORD_SIZE: u64 = 28;
}

/// Raw `segm` record as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub(crate) struct SegmentRecord {
    pub flags: u32,
    pub start: u64,
    pub org_size: u64,
    pub arc_size: u64,
}

impl SegmentRecord {
    fn into_segment(self) -> ArchiveResult<Segment> {
        Ok(Segment {
            encoding: EncodeMethod::from_flags(self.flags)?,
            start: self.start,
            org_size: self.org_size,
            arc_size: self.arc_size,
        })
    }
}

impl From<&Segment> for SegmentRecord {
    fn from(segment: &Segment) -> Self {
        Self {
            flags: segment.encoding.as_flags(),
            start: segment.start,
            org_size: segment.org_size,
            arc_size: segment.arc_size,
        }
    }
}

/// Raw `info` record as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub(crate) struct InfoRecord {
    pub flags: u32,
    pub org_size: u64,
    pub arc_size: u64,
    pub name_len: u16,
    #[br(count = name_len)]
    pub name: Vec<u16>,
}

impl InfoRecord {
    pub fn new(flags: u32, org_size: u64, arc_size: u64, path: &str) -> ArchiveResult<Self> {
        let name: Vec<u16> = path.encode_utf16().collect();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            ArchiveError::InvalidPath(format!("name longer than 65535 UTF-16 units: {path}"))
        })?;
        Ok(Self {
            flags,
            org_size,
            arc_size,
            name_len,
            name,
        })
    }

    pub fn encoded_size(&self) -> u64 {
        22 + 2 * u64::from(self.name_len)
    }
}

/// One logical file inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Normalized forward-slash relative path
    pub path: String,
    /// Flag word from the `info` chunk
    pub flags: u32,
    /// Decompressed length in bytes
    pub org_size: u64,
    /// Stored length across all segments
    pub arc_size: u64,
    /// Adler-32 of the decompressed content
    pub hash: u32,
    /// Timestamp from an optional `time` chunk
    pub timestamp: Option<u64>,
    /// Ordered segment table
    pub segments: Vec<Segment>,
}

impl IndexEntry {
    /// Whether the protection bit is set
    pub fn is_protected(&self) -> bool {
        self.flags & FLAG_PROTECTED != 0
    }

    /// Whether any segment is zlib encoded
    pub fn is_compressed(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.encoding == EncodeMethod::Zlib)
    }
}

/// Normalize an entry path to the form used as index key
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Entry being assembled between `File` and `adlr`
#[derive(Debug, Default)]
struct PendingEntry {
    info: Option<InfoRecord>,
    segments: Vec<Segment>,
    timestamp: Option<u64>,
}

impl PendingEntry {
    fn commit(self, hash: u32) -> ArchiveResult<IndexEntry> {
        let info = self
            .info
            .ok_or_else(|| ArchiveError::invalid_index("entry committed without info chunk"))?;

        let name = String::from_utf16(&info.name)
            .map_err(|e| ArchiveError::invalid_index(format!("entry name is not UTF-16: {e}")))?;
        let path = normalize_path(&name);

        let segment_total = self
            .segments
            .iter()
            .try_fold(0u64, |total, s| total.checked_add(s.org_size))
            .ok_or_else(|| {
                ArchiveError::invalid_index(format!("entry {path}: segment sizes overflow"))
            })?;
        if segment_total != info.org_size {
            return Err(ArchiveError::invalid_index(format!(
                "entry {path}: segments hold {segment_total} bytes, info declares {}",
                info.org_size
            )));
        }

        Ok(IndexEntry {
            path,
            flags: info.flags,
            org_size: info.org_size,
            arc_size: info.arc_size,
            hash,
            timestamp: self.timestamp,
            segments: self.segments,
        })
    }
}

/// Walk decompressed index content and return its entries in index order
///
/// Duplicate paths keep the first committed entry.
pub(crate) fn parse_index(data: &[u8]) -> ArchiveResult<Vec<IndexEntry>> {
    let total = data.len() as u64;
    let mut cursor = Cursor::new(data);
    let mut entries: Vec<IndexEntry> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut pending: Option<PendingEntry> = None;

    while cursor.position() < total {
        let remaining = total - cursor.position();
        if remaining < ChunkHeader::SIZE {
            return Err(ArchiveError::invalid_index(format!(
                "{remaining} trailing bytes cannot hold a chunk header"
            )));
        }

        let chunk: ChunkHeader = cursor.read_le()?;
        let payload_start = cursor.position();
        trace!(
            "index chunk {} ({} bytes) at {}",
            String::from_utf8_lossy(&chunk.tag),
            chunk.size,
            payload_start - ChunkHeader::SIZE
        );

        if chunk.tag == CHUNK_FILE {
            if pending.is_some() {
                return Err(ArchiveError::invalid_index(
                    "File chunk opened before previous entry was committed",
                ));
            }
            pending = Some(PendingEntry::default());
            continue;
        }

        if chunk.size > total - payload_start {
            return Err(ArchiveError::invalid_index(format!(
                "chunk {} declares {} bytes, only {} remain",
                String::from_utf8_lossy(&chunk.tag),
                chunk.size,
                total - payload_start
            )));
        }
        let payload_end = payload_start + chunk.size;

        let entry = match chunk.tag {
            CHUNK_INFO | CHUNK_SEGM | CHUNK_TIME | CHUNK_ADLR => {
                pending.as_mut().ok_or_else(|| {
                    ArchiveError::invalid_index(format!(
                        "{} chunk outside of a File chunk",
                        String::from_utf8_lossy(&chunk.tag)
                    ))
                })?
            }
            other => return Err(ArchiveError::UnknownChunk(other)),
        };

        match chunk.tag {
            CHUNK_INFO => {
                let info: InfoRecord = cursor.read_le()?;
                entry.info = Some(info);
            }
            CHUNK_SEGM => {
                if chunk.size % Segment::RECORD_SIZE != 0 {
                    return Err(ArchiveError::invalid_index(format!(
                        "segm chunk size {} is not a multiple of {}",
                        chunk.size,
                        Segment::RECORD_SIZE
                    )));
                }
                for _ in 0..chunk.size / Segment::RECORD_SIZE {
                    let record: SegmentRecord = cursor.read_le()?;
                    entry.segments.push(record.into_segment()?);
                }
            }
            CHUNK_TIME => {
                let timestamp: u64 = cursor.read_le()?;
                entry.timestamp = Some(timestamp);
            }
            _ => {
                let hash: u32 = cursor.read_le()?;
                if let Some(done) = pending.take() {
                    let committed = done.commit(hash)?;
                    if seen.insert(committed.path.clone()) {
                        entries.push(committed);
                    } else {
                        warn!("duplicate archive entry {} ignored", committed.path);
                    }
                }
            }
        }

        if cursor.position() > payload_end {
            return Err(ArchiveError::invalid_index(format!(
                "{} record overruns its chunk",
                String::from_utf8_lossy(&chunk.tag)
            )));
        }
        cursor.set_position(payload_end);
    }

    if pending.is_some() {
        return Err(ArchiveError::invalid_index(
            "index ended inside an uncommitted entry",
        ));
    }

    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::BinWriterExt;

    fn chunk(tag: [u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&tag);
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn info(path: &str, org_size: u64) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        cursor
            .write_le(&InfoRecord::new(0, org_size, org_size, path).expect("Failed to build info"))
            .expect("Failed to write info");
        cursor.into_inner()
    }

    fn segm(segments: &[(u32, u64, u64, u64)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        for &(flags, start, org_size, arc_size) in segments {
            cursor
                .write_le(&SegmentRecord {
                    flags,
                    start,
                    org_size,
                    arc_size,
                })
                .expect("Failed to write segment");
        }
        cursor.into_inner()
    }

    fn simple_entry(path: &str) -> Vec<u8> {
        let mut out = chunk(CHUNK_FILE, &[]);
        out.extend(chunk(CHUNK_INFO, &info(path, 5)));
        out.extend(chunk(CHUNK_SEGM, &segm(&[(0, 19, 5, 5)])));
        out.extend(chunk(CHUNK_ADLR, &0x0102_0304u32.to_le_bytes()));
        out
    }

    #[test]
    fn test_parse_single_entry() {
        let entries = parse_index(&simple_entry("a.txt")).expect("Failed to parse index");

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.path, "a.txt");
        assert_eq!(entry.org_size, 5);
        assert_eq!(entry.hash, 0x0102_0304);
        assert_eq!(entry.timestamp, None);
        assert_eq!(
            entry.segments,
            vec![Segment {
                encoding: EncodeMethod::Raw,
                start: 19,
                org_size: 5,
                arc_size: 5,
            }]
        );
    }

    #[test]
    fn test_parse_normalizes_backslashes() {
        let entries = parse_index(&simple_entry("image\\bg\\sky.png")).expect("Failed to parse");
        assert_eq!(entries[0].path, "image/bg/sky.png");
    }

    #[test]
    fn test_file_chunk_with_nested_length() {
        let mut nested = chunk(CHUNK_INFO, &info("n.bin", 5));
        nested.extend(chunk(CHUNK_SEGM, &segm(&[(1, 100, 5, 9)])));
        nested.extend(chunk(CHUNK_TIME, &42u64.to_le_bytes()));
        nested.extend(chunk(CHUNK_ADLR, &7u32.to_le_bytes()));
        let data = chunk(CHUNK_FILE, &nested);

        let entries = parse_index(&data).expect("Failed to parse index");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, Some(42));
        assert!(entries[0].is_compressed());
        assert_eq!(entries[0].segments[0].arc_size, 9);
    }

    #[test]
    fn test_unknown_chunk_rejected() {
        let mut data = simple_entry("a.txt");
        data.extend(chunk(*b"XXXX", &[0; 4]));

        assert!(matches!(
            parse_index(&data),
            Err(ArchiveError::UnknownChunk(tag)) if &tag == b"XXXX"
        ));
    }

    #[test]
    fn test_uncommitted_entry_rejected() {
        let mut data = chunk(CHUNK_FILE, &[]);
        data.extend(chunk(CHUNK_INFO, &info("a.txt", 5)));
        data.extend(chunk(CHUNK_SEGM, &segm(&[(0, 19, 5, 5)])));

        let err = parse_index(&data).expect_err("Uncommitted entry must fail");
        assert!(err.is_format_error());
    }

    #[test]
    fn test_segment_size_mismatch_rejected() {
        let mut data = chunk(CHUNK_FILE, &[]);
        data.extend(chunk(CHUNK_INFO, &info("a.txt", 10)));
        data.extend(chunk(CHUNK_SEGM, &segm(&[(0, 19, 5, 5)])));
        data.extend(chunk(CHUNK_ADLR, &0u32.to_le_bytes()));

        assert!(matches!(
            parse_index(&data),
            Err(ArchiveError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_segment_size_overflow_rejected() {
        let mut data = chunk(CHUNK_FILE, &[]);
        data.extend(chunk(CHUNK_INFO, &info("a.txt", 1)));
        data.extend(chunk(CHUNK_SEGM, &segm(&[(0, 19, u64::MAX, 5), (0, 24, 2, 2)])));
        data.extend(chunk(CHUNK_ADLR, &0u32.to_le_bytes()));

        assert!(matches!(
            parse_index(&data),
            Err(ArchiveError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_chunk_outside_file_rejected() {
        let data = chunk(CHUNK_ADLR, &0u32.to_le_bytes());
        assert!(matches!(
            parse_index(&data),
            Err(ArchiveError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_unsupported_segment_method() {
        let mut data = chunk(CHUNK_FILE, &[]);
        data.extend(chunk(CHUNK_INFO, &info("a.txt", 5)));
        data.extend(chunk(CHUNK_SEGM, &segm(&[(2, 19, 5, 5)])));
        data.extend(chunk(CHUNK_ADLR, &0u32.to_le_bytes()));

        assert!(matches!(
            parse_index(&data),
            Err(ArchiveError::UnsupportedEncoding(2))
        ));
    }

    #[test]
    fn test_overlong_chunk_rejected() {
        let mut data = chunk(CHUNK_FILE, &[]);
        data.extend_from_slice(&CHUNK_INFO);
        data.extend_from_slice(&1000u64.to_le_bytes());
        data.extend_from_slice(&[0; 8]);

        assert!(matches!(
            parse_index(&data),
            Err(ArchiveError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_duplicate_path_keeps_first() {
        let mut data = simple_entry("dup.txt");
        let mut second = chunk(CHUNK_FILE, &[]);
        second.extend(chunk(CHUNK_INFO, &info("dup.txt", 5)));
        second.extend(chunk(CHUNK_SEGM, &segm(&[(0, 500, 5, 5)])));
        second.extend(chunk(CHUNK_ADLR, &9u32.to_le_bytes()));
        data.extend(second);

        let entries = parse_index(&data).expect("Failed to parse index");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].segments[0].start, 19);
    }

    #[test]
    fn test_protection_flag() {
        let entry = IndexEntry {
            path: "p".to_string(),
            flags: FLAG_PROTECTED,
            org_size: 0,
            arc_size: 0,
            hash: 1,
            timestamp: None,
            segments: Vec::new(),
        };
        assert!(entry.is_protected());
        assert!(!entry.is_compressed());
    }
}
