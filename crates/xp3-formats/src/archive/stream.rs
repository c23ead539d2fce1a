//! Forward-only reader over an entry's segments
//!
//! Presents the RAW/zlib segments of one entry as a single continuous
//! decompressed byte stream. One `read` call fills the caller's buffer
//! across as many segment boundaries as needed.

use std::io::{self, Read, Seek, SeekFrom, Take};

use flate2::read::ZlibDecoder;
use tracing::trace;

use super::error::ArchiveError;
use super::index::{EncodeMethod, IndexEntry, Segment};
use crate::adler32::Adler32;

/// Decoder over the current segment's stored bytes
enum SegmentSource<R: Read> {
    Raw(Take<R>),
    Zlib(Box<ZlibDecoder<Take<R>>>),
}

impl<R: Read> SegmentSource<R> {
    fn into_inner(self) -> R {
        match self {
            Self::Raw(take) => take.into_inner(),
            Self::Zlib(decoder) => decoder.into_inner().into_inner(),
        }
    }
}

impl<R: Read> Read for SegmentSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Raw(take) => take.read(buf),
            Self::Zlib(decoder) => decoder.read(buf),
        }
    }
}

/// Reader position within the segment table
enum StreamState<R: Read> {
    /// Positioned before segment `index`; the reader is idle
    AtSegmentStart { index: usize, reader: R },
    /// Producing bytes of segment `index`
    Streaming {
        index: usize,
        consumed: u64,
        source: SegmentSource<R>,
    },
    /// All segments drained
    Exhausted,
    /// A previous read failed; the reader is gone
    Failed,
}

/// Expected checksum and running hasher for optional verification
struct ChecksumCheck {
    path: String,
    expected: u32,
    hasher: Adler32,
}

/// Decompressing reader over one entry's segments
///
/// Not shareable between threads while reading; every
/// [`Xp3Archive::extract`](super::Xp3Archive::extract) call yields an
/// independent stream with its own file handle.
pub struct SegmentStream<R: Read + Seek> {
    segments: Vec<Segment>,
    state: StreamState<R>,
    total_size: u64,
    position: u64,
    checksum: Option<ChecksumCheck>,
}

impl<R: Read + Seek> SegmentStream<R> {
    /// Create a stream over `segments` read from `reader`
    pub fn new(reader: R, segments: Vec<Segment>) -> Self {
        let total_size = segments
            .iter()
            .fold(0u64, |total, s| total.saturating_add(s.org_size));
        let state = if segments.is_empty() {
            StreamState::Exhausted
        } else {
            StreamState::AtSegmentStart { index: 0, reader }
        };

        Self {
            segments,
            state,
            total_size,
            position: 0,
            checksum: None,
        }
    }

    /// Create a stream over an index entry's segments
    pub fn for_entry(reader: R, entry: &IndexEntry) -> Self {
        Self::new(reader, entry.segments.clone())
    }

    /// Verify the produced bytes against `expected` once the stream ends
    ///
    /// A mismatch makes the final `read` fail with
    /// [`ArchiveError::ChecksumMismatch`] wrapped in an `io::Error`.
    pub fn with_checksum(mut self, path: impl Into<String>, expected: u32) -> Self {
        self.checksum = Some(ChecksumCheck {
            path: path.into(),
            expected,
            hasher: Adler32::new(),
        });
        self
    }

    /// Total decompressed length of the entry
    pub fn len(&self) -> u64 {
        self.total_size
    }

    /// Whether the entry has no content at all
    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// Bytes produced so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether every segment has been drained
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, StreamState::Exhausted)
    }

    /// Seek to a segment and wrap it in the decoder its method requires
    fn open_segment(&self, index: usize, mut reader: R) -> io::Result<SegmentSource<R>> {
        let segment = &self.segments[index];
        trace!(
            "opening segment {} ({:?}, start {}, {} -> {} bytes)",
            index, segment.encoding, segment.start, segment.arc_size, segment.org_size
        );

        reader.seek(SeekFrom::Start(segment.start))?;
        let stored = reader.take(segment.arc_size);
        Ok(match segment.encoding {
            EncodeMethod::Raw => SegmentSource::Raw(stored),
            EncodeMethod::Zlib => SegmentSource::Zlib(Box::new(ZlibDecoder::new(stored))),
        })
    }

    /// Move past a drained segment
    fn finish_segment(&mut self, index: usize, reader: R) -> io::Result<()> {
        let next = index + 1;
        if next < self.segments.len() {
            self.state = StreamState::AtSegmentStart {
                index: next,
                reader,
            };
            return Ok(());
        }

        self.state = StreamState::Exhausted;
        if let Some(check) = &self.checksum {
            let actual = check.hasher.finish();
            if actual != check.expected {
                return Err(ArchiveError::ChecksumMismatch {
                    path: check.path.clone(),
                    expected: check.expected,
                    actual,
                }
                .into_io());
            }
        }
        Ok(())
    }

    fn truncated(&self, segment: usize, actual: u64) -> io::Error {
        ArchiveError::Truncated {
            segment,
            expected: self.segments[segment].org_size,
            actual,
        }
        .into_io()
    }

    /// Fill as much of `buf` as the current segment allows
    ///
    /// An `Interrupted` read leaves the stream where it was, so the caller
    /// can retry.

    fn read_segment(
        &mut self,
        index: usize,
        consumed: u64,
        mut source: SegmentSource<R>,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let remaining = self.segments[index].org_size - consumed;
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));

        let mut filled = 0;
        while filled < want {
            match source.read(&mut buf[filled..want]) {
                Ok(0) => return Err(self.truncated(index, consumed + filled as u64)),
                Ok(n) => filled += n,
                // zlib reports a stream cut short as UnexpectedEof
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(self.truncated(index, consumed + filled as u64));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if filled == 0 {
                        self.state = StreamState::Streaming {
                            index,
                            consumed,
                            source,
                        };
                        return Err(e);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(check) = &mut self.checksum {
            check.hasher.update(&buf[..filled]);
        }
        self.position += filled as u64;

        let consumed = consumed + filled as u64;
        if consumed == self.segments[index].org_size {
            self.finish_segment(index, source.into_inner())?;
        } else {
            self.state = StreamState::Streaming {
                index,
                consumed,
                source,
            };
        }
        Ok(filled)
    }
}

impl<R: Read + Seek> Read for SegmentStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            match std::mem::replace(&mut self.state, StreamState::Failed) {
                StreamState::AtSegmentStart { index, reader } => {
                    // Zero-length segments contribute nothing
                    if self.segments[index].org_size == 0 {
                        self.finish_segment(index, reader)?;
                        continue;
                    }
                    let source = self.open_segment(index, reader)?;
                    self.state = StreamState::Streaming {
                        index,
                        consumed: 0,
                        source,
                    };
                }
                StreamState::Streaming {
                    index,
                    consumed,
                    source,
                } => match self.read_segment(index, consumed, source, &mut buf[filled..]) {
                    Ok(n) => filled += n,
                    // Hand back what earlier segments produced; the retry resumes here
                    Err(e) if e.kind() == io::ErrorKind::Interrupted && filled > 0 => break,
                    Err(e) => return Err(e),
                },
                StreamState::Exhausted => {
                    self.state = StreamState::Exhausted;
                    break;
                }
                StreamState::Failed => {
                    return Err(io::Error::other("segment stream failed on a previous read"));
                }
            }
        }

        Ok(filled)
    }
}
