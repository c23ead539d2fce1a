//! Cache behaviour under concurrent access and failure

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use xp3_formats::{EncodeMethod, Xp3Builder};
use xp3_storage::{
    ArchiveCache, Blob, ResourceDecoder, ResourceLocator, ResourceService, StorageConfig,
    StorageError, StreamInfo,
};

const THREADS: usize = 8;

fn write_container(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("data.xp3");
    let mut builder = Xp3Builder::new();
    builder.add_file("a.txt", b"hello", EncodeMethod::Raw);
    builder.add_split("b.bin", b"0123456789", 5, EncodeMethod::Zlib);
    builder
        .write_to_path(&path, EncodeMethod::Zlib)
        .expect("Failed to write container");
    path
}

/// Byte-length decoder counting its invocations
#[derive(Default)]
struct Length {
    calls: AtomicUsize,
}

impl ResourceDecoder for Length {
    type Output = usize;

    fn decode_stream(&self, info: StreamInfo) -> xp3_storage::Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(info.read_all()?.len())
    }
}

#[test]
fn concurrent_archive_lookups_share_one_handle() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_container(&dir);
    let cache = ArchiveCache::new();
    let barrier = Barrier::new(THREADS);

    let handles: Vec<_> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache
                        .archive_for(&path)
                        .expect("lookup")
                        .expect("container exists")
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("worker panicked"))
            .collect()
    });

    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }

    let stats = cache.stats();
    assert_eq!(cache.len(), 1);
    assert!(stats.parses >= 1 && stats.parses <= THREADS as u64);
    assert_eq!(stats.discarded, stats.parses - 1);
    assert_eq!(stats.hits + stats.misses, THREADS as u64);
}

#[test]
fn concurrent_loads_return_one_resource() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_container(&dir);
    let service = ResourceService::new(StorageConfig::new(dir.path()));
    let locator = ResourceLocator::archive(&path, "b.bin");
    let decoder = Length::default();
    let barrier = Barrier::new(THREADS);

    let handles: Vec<_> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    service.load_with(&locator, &decoder).expect("load")
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("worker panicked"))
            .collect()
    });

    for handle in &handles {
        assert!(Arc::ptr_eq(&handles[0], handle));
        assert_eq!(*handle.value(), 10);
    }
    assert_eq!(service.resources().len(), 1);

    let calls = decoder.calls.load(Ordering::SeqCst);
    assert!((1..=THREADS).contains(&calls));
    assert_eq!(service.resources().stats().discarded as usize, calls - 1);

    // Once cached, no further decodes
    service.load_with(&locator, &decoder).expect("load");
    assert_eq!(decoder.calls.load(Ordering::SeqCst), calls);
}

#[test]
fn release_then_reload_decodes_again() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    write_container(&dir);
    let service = ResourceService::new(StorageConfig::new(dir.path()));
    let locator = service.locate("data.xp3/a.txt").expect("locate");
    let decoder = Length::default();

    let first = service.load_with(&locator, &decoder).expect("load");
    assert!(service.release(&first));
    let second = service.load_with(&locator, &decoder).expect("load");

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*second.value(), 5);
}

#[test]
fn invalid_container_fails_without_caching() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let bogus = dir.path().join("bogus.xp3");
    std::fs::write(&bogus, b"definitely not an xp3 container").expect("write");
    let service = ResourceService::new(StorageConfig::new(dir.path()));
    let locator = ResourceLocator::archive(&bogus, "a.txt");

    let err = service.load::<Blob>(&locator).expect_err("must fail");
    assert!(matches!(err, StorageError::ResourceService { .. }));
    assert!(err.is_format_error());
    assert!(service.archives().is_empty());
    assert!(service.resources().is_empty());

    assert!(service.exists(&locator).is_err());
}

#[test]
fn verified_streams_reject_corrupt_entries() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_container(&dir);

    // a.txt is the first RAW segment, right after the 19-byte header
    let mut bytes = std::fs::read(&path).expect("read");
    bytes[19] = b'j';
    std::fs::write(&path, bytes).expect("write");

    let locator = ResourceLocator::archive(&path, "a.txt");

    let lenient = ResourceService::new(StorageConfig::new(dir.path()));
    let blob = lenient.load::<Blob>(&locator).expect("unverified load");
    assert_eq!(blob.as_bytes(), b"jello");

    let strict =
        ResourceService::new(StorageConfig::new(dir.path()).with_verify_checksums(true));
    let err = strict.load::<Blob>(&locator).expect_err("checksum must fail");
    assert!(matches!(err, StorageError::ResourceService { .. }));
    assert!(strict.resources().is_empty());
}
