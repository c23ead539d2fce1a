//! Pack, list, extract and verify through the command layer

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use xp3_formats::ArchiveError;
use xp3_tool::ToolError;
use xp3_tool::commands::{self, PackOptions};

fn populate(root: &Path) {
    fs::create_dir_all(root.join("image")).unwrap();
    fs::write(root.join("startup.tjs"), b"// startup script").unwrap();
    fs::write(root.join("image/bg.png"), vec![7u8; 3000]).unwrap();
    fs::write(root.join("empty.txt"), b"").unwrap();
}

fn pack(dir: &TempDir, options: &PackOptions) -> std::path::PathBuf {
    let input = dir.path().join("assets");
    populate(&input);
    let output = dir.path().join("data.xp3");
    let mut log = Vec::new();
    let count = commands::pack(&input, &output, options, &mut log).unwrap();
    assert_eq!(count, 3);
    output
}

#[test]
fn pack_then_list_json() {
    let dir = TempDir::new().unwrap();
    let archive = pack(
        &dir,
        &PackOptions {
            compress: true,
            segment_size: Some(1024),
            compress_index: true,
            ..PackOptions::default()
        },
    );

    let mut out = Vec::new();
    let entries = commands::list(&archive, true, &mut out).unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["empty.txt", "image/bg.png", "startup.tjs"]);

    let bg = &entries[1];
    assert_eq!(bg.size, 3000);
    assert_eq!(bg.segments, 3);
    assert!(bg.compressed);

    let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    assert_eq!(parsed[2]["path"], "startup.tjs");
}

#[test]
fn pack_then_extract_all() {
    let dir = TempDir::new().unwrap();
    let archive = pack(&dir, &PackOptions::default());
    let output = dir.path().join("out");

    let mut out = Vec::new();
    let written = commands::extract(&archive, &[], &output, true, &mut out).unwrap();
    assert_eq!(written, 3);
    assert_eq!(
        fs::read(output.join("startup.tjs")).unwrap(),
        b"// startup script"
    );
    assert_eq!(fs::read(output.join("image/bg.png")).unwrap(), vec![7u8; 3000]);
    assert!(fs::read(output.join("empty.txt")).unwrap().is_empty());
}

#[test]
fn extract_selected_and_missing() {
    let dir = TempDir::new().unwrap();
    let archive = pack(&dir, &PackOptions::default());
    let output = dir.path().join("out");

    let mut out = Vec::new();
    let written =
        commands::extract(&archive, &["image/bg.png".to_string()], &output, false, &mut out)
            .unwrap();
    assert_eq!(written, 1);
    assert!(!output.join("startup.tjs").exists());

    let err = commands::extract(&archive, &["nope.txt".to_string()], &output, false, &mut out)
        .unwrap_err();
    assert!(matches!(err, ToolError::Archive(ref e) if e.is_not_found()));
}

#[test]
fn extract_rejects_unsafe_request() {
    let dir = TempDir::new().unwrap();
    let archive = pack(&dir, &PackOptions::default());
    let output = dir.path().join("out");

    for unsafe_path in ["../x", "/etc/passwd", "image/../../x"] {
        let mut out = Vec::new();
        let err =
            commands::extract(&archive, &[unsafe_path.to_string()], &output, false, &mut out)
                .unwrap_err();
        assert!(
            matches!(err, ToolError::Archive(ArchiveError::InvalidPath(_))),
            "{unsafe_path:?} must be refused"
        );
        assert!(out.is_empty());
    }
    assert!(!dir.path().join("x").exists());
}

#[test]
fn verify_reports_corruption() {
    let dir = TempDir::new().unwrap();
    let archive = pack(&dir, &PackOptions::default());

    let mut out = Vec::new();
    assert_eq!(commands::verify(&archive, &mut out).unwrap(), 3);

    // RAW segments: the first non-empty entry's bytes follow the header
    let mut bytes = fs::read(&archive).unwrap();
    bytes[19] ^= 0xFF;
    fs::write(&archive, bytes).unwrap();

    let mut out = Vec::new();
    let err = commands::verify(&archive, &mut out).unwrap_err();
    assert!(matches!(err, ToolError::VerifyFailed { failed: 1, total: 3 }));
    assert!(String::from_utf8(out).unwrap().contains("FAILED image/bg.png"));
}
