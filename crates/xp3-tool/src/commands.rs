//! Command implementations.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xp3_formats::archive::validate_entry_path;
use xp3_formats::{ArchiveError, EncodeMethod, IndexEntry, Xp3Archive, Xp3Builder};

use crate::error::{ToolError, ToolResult};

/// One index entry as printed by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    /// Entry path
    pub path: String,
    /// Decoded size in bytes
    pub size: u64,
    /// Stored size in bytes
    pub stored_size: u64,
    /// Number of segments
    pub segments: usize,
    /// Whether any segment is zlib-compressed
    pub compressed: bool,
    /// Whether the protection flag is set
    pub protected: bool,
    /// Adler-32 of the decoded content
    pub adler32: String,
    /// Timestamp from the `time` chunk, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl From<&IndexEntry> for EntrySummary {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            path: entry.path.clone(),
            size: entry.org_size,
            stored_size: entry.arc_size,
            segments: entry.segments.len(),
            compressed: entry.is_compressed(),
            protected: entry.is_protected(),
            adler32: format!("{:08x}", entry.hash),
            timestamp: entry.timestamp,
        }
    }
}

/// Print the index of `archive`
pub fn list<W: Write>(archive: &Path, json: bool, out: &mut W) -> ToolResult<Vec<EntrySummary>> {
    let archive = Xp3Archive::open(archive)?;
    let entries: Vec<EntrySummary> = archive.entries().iter().map(EntrySummary::from).collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &entries)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{:>12} {:>12} {:>4}  path", "size", "stored", "segs")?;
        for entry in &entries {
            let marker = if entry.protected { "*" } else { "" };
            writeln!(
                out,
                "{:>12} {:>12} {:>4}  {}{}",
                entry.size, entry.stored_size, entry.segments, entry.path, marker
            )?;
        }
        let total: u64 = entries.iter().map(|e| e.size).sum();
        writeln!(out, "{} entries, {} bytes", entries.len(), total)?;
    }

    Ok(entries)
}

/// Extract `entries` (or every entry when empty) from `archive` into `output`
///
/// Returns the number of entries written. Naming an entry whose path is not
/// a plain relative path fails with [`ArchiveError::InvalidPath`].
pub fn extract<W: Write>(
    archive: &Path,
    entries: &[String],
    output: &Path,
    verify: bool,
    out: &mut W,
) -> ToolResult<usize> {
    let archive = Xp3Archive::open(archive)?;
    let from_index = entries.is_empty();
    let selected: Vec<String> = if from_index {
        archive.list_files()
    } else {
        entries.to_vec()
    };

    let mut written = 0;
    for entry_path in &selected {
        // Never let a path escape `output`. Unsafe names found in the index
        // are skipped, unsafe names asked for on the command line are errors
        let relative = match validate_entry_path(entry_path) {
            Ok(relative) => relative,
            Err(e) if from_index => {
                warn!("Skipping unsafe entry path {:?}: {}", entry_path, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let (entry, mut stream) = if verify {
            archive.extract_verified(&relative)?
        } else {
            archive.extract(&relative)?
        };

        let target = output.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ToolError::io(parent, e))?;
        }

        let mut file =
            BufWriter::new(File::create(&target).map_err(|e| ToolError::io(&target, e))?);
        let copied = io::copy(&mut stream, &mut file).map_err(|e| {
            // Stream failures carry an archive error, file failures do not
            match ArchiveError::from_io(e) {
                ArchiveError::Io(source) => ToolError::io(&target, source),
                other => ToolError::Archive(other),
            }
        })?;
        file.flush().map_err(|e| ToolError::io(&target, e))?;

        debug!("Extracted {} ({} bytes)", entry.path, copied);
        writeln!(out, "{}", entry.path)?;
        written += 1;
    }

    info!("Extracted {} entries to {:?}", written, output);
    Ok(written)
}

/// Verify every entry of `archive`
pub fn verify<W: Write>(archive: &Path, out: &mut W) -> ToolResult<usize> {
    let archive = Xp3Archive::open(archive)?;
    let failures = archive.verify_all();

    for (path, error) in &failures {
        writeln!(out, "FAILED {path}: {error}")?;
    }

    let total = archive.len();
    if failures.is_empty() {
        writeln!(out, "{total} entries OK")?;
        Ok(total)
    } else {
        Err(ToolError::VerifyFailed {
            failed: failures.len(),
            total,
        })
    }
}

/// Settings for `pack`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Store segments zlib-compressed
    pub compress: bool,
    /// Maximum segment size, unsplit when `None`
    pub segment_size: Option<usize>,
    /// Store the index zlib-compressed
    pub compress_index: bool,
    /// zlib level
    pub level: u32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compress: false,
            segment_size: None,
            compress_index: false,
            level: 6,
        }
    }
}

/// Pack every regular file under `input` into a new container at `output`
///
/// Entry paths are relative to `input`, `/`-separated, in sorted order.
pub fn pack<W: Write>(
    input: &Path,
    output: &Path,
    options: &PackOptions,
    out: &mut W,
) -> ToolResult<usize> {
    let encoding = if options.compress {
        EncodeMethod::Zlib
    } else {
        EncodeMethod::Raw
    };
    let index_encoding = if options.compress_index {
        EncodeMethod::Zlib
    } else {
        EncodeMethod::Raw
    };

    let mut builder = Xp3Builder::new().with_compression(options.level);
    for item in WalkDir::new(input).sort_by_file_name() {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }

        let path = item.path();
        // The output may live inside the tree being packed
        if same_file(path, output) {
            continue;
        }

        let entry_path = relative_entry_path(input, path);
        let data = fs::read(path).map_err(|e| ToolError::io(path, e))?;
        match options.segment_size {
            Some(size) => builder.add_split(&entry_path, &data, size, encoding),
            None => builder.add_file(&entry_path, &data, encoding),
        };
        writeln!(out, "{entry_path}")?;
    }

    let entries = builder.write_to_path(output, index_encoding)?;
    info!("Packed {} entries into {:?}", entries.len(), output);
    Ok(entries.len())
}

fn relative_entry_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| -> Option<PathBuf> { p.canonicalize().ok() };
    matches!((canonical(a), canonical(b)), (Some(a), Some(b)) if a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_entry_path() {
        let root = Path::new("/assets");
        assert_eq!(
            relative_entry_path(root, Path::new("/assets/image/bg.png")),
            "image/bg.png"
        );
        assert_eq!(relative_entry_path(root, Path::new("/assets/a.txt")), "a.txt");
    }

    #[test]
    fn test_entry_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.xp3");
        let mut builder = Xp3Builder::new();
        builder
            .add_split("a.bin", b"0123456789", 4, EncodeMethod::Zlib)
            .flags(xp3_formats::archive::FLAG_PROTECTED);
        builder.write_to_path(&path, EncodeMethod::Raw).unwrap();

        let archive = Xp3Archive::open(&path).unwrap();
        let summary = EntrySummary::from(&archive.entries()[0]);
        assert_eq!(summary.size, 10);
        assert_eq!(summary.segments, 3);
        assert!(summary.compressed);
        assert!(summary.protected);
        assert_eq!(summary.adler32.len(), 8);
    }
}
