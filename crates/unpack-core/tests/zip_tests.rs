//! End-to-end ZIP parsing and extraction tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::fs;
use std::io::Cursor;
use std::path::Path;

use common::RawZipEntry;
use common::raw_zip;
use tempfile::TempDir;
use unpack_core::ExtractionError;
use unpack_core::ExtractionOptions;
use unpack_core::ProgressCallback;
use unpack_core::extract_archive;
use unpack_core::extract_archive_with_progress;
use unpack_core::formats::ZipArchive;

fn quiet() -> ExtractionOptions {
    ExtractionOptions::default().with_quiet(true)
}

fn write_archive(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

#[test]
fn test_three_entry_zip_end_to_end() {
    let temp = TempDir::new().unwrap();
    let data = raw_zip(
        &[
            RawZipEntry::dir("d/"),
            RawZipEntry::file("a.txt", b"hi"),
            RawZipEntry::symlink("link", "a.txt"),
        ],
        b"",
    );
    let archive = write_archive(temp.path(), "three.zip", &data);
    let out = temp.path().join("out");

    let report = extract_archive(&archive, &out, &quiet()).unwrap();

    assert!(out.join("d").is_dir());
    let contents = fs::read(out.join("a.txt")).unwrap();
    assert_eq!(contents, b"hi");
    assert_eq!(crc32fast::hash(&contents), crc32fast::hash(b"hi"));
    assert_eq!(report.directories_created, 1);
    assert_eq!(report.files_extracted, 1);

    #[cfg(unix)]
    {
        assert_eq!(report.symlinks_created, 1);
        assert_eq!(
            fs::read_link(out.join("link")).unwrap(),
            Path::new("a.txt")
        );
        assert_eq!(fs::read(out.join("link")).unwrap(), b"hi");
    }
}

#[test]
fn test_cancel_after_first_chunk() {
    struct CancelFirstChunk {
        entries: usize,
    }

    impl ProgressCallback for CancelFirstChunk {
        fn on_entry(&mut self, _name: &str, _current: usize, _total: usize) -> bool {
            self.entries += 1;
            true
        }

        fn on_progress(&mut self, _bytes_done: u64) -> bool {
            false
        }

        fn on_complete(&mut self) {}
    }

    let temp = TempDir::new().unwrap();
    let big = vec![b'z'; 10_000];
    let data = raw_zip(
        &[
            RawZipEntry::file("first.bin", &big),
            RawZipEntry::file("second.bin", &big),
        ],
        b"",
    );
    let archive = write_archive(temp.path(), "big.zip", &data);
    let out = temp.path().join("out");

    let mut progress = CancelFirstChunk { entries: 0 };
    let err = extract_archive_with_progress(&archive, &out, &quiet(), &mut progress).unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(progress.entries, 1);
    assert!(!out.join("second.bin").exists());
    let partial = fs::metadata(out.join("first.bin")).unwrap().len();
    assert!(partial > 0 && partial <= 4096, "wrote {partial} bytes");
}

#[test]
fn test_zip64_sentinel_resolved() {
    let payload = b"zip64 sized payload";
    let entry = RawZipEntry {
        sentinel_sizes: true,
        central_extra: common::zip64_sizes_extra(payload.len() as u64, payload.len() as u64),
        ..RawZipEntry::file("big.dat", payload)
    };
    let data = raw_zip(&[entry], b"");

    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    let entry = &archive.entries()[0];
    assert_eq!(entry.uncompressed_size, payload.len() as u64);
    assert_eq!(entry.compressed_size, payload.len() as u64);

    let mut out = Vec::new();
    archive.decompress(0, &mut out).unwrap();
    assert_eq!(out, payload);
}

#[test]
fn test_zip64_sentinel_without_extra_fails() {
    let entry = RawZipEntry {
        sentinel_sizes: true,
        ..RawZipEntry::file("big.dat", b"data")
    };
    let data = raw_zip(&[entry], b"");
    assert!(ZipArchive::new(Cursor::new(data)).is_err());
}

#[test]
fn test_store_round_trip_crc() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(9000).collect();
    let data = raw_zip(&[RawZipEntry::file("bytes.bin", &payload)], b"");

    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    let expected_crc = archive.entries()[0].crc32;
    let expected_len = archive.entries()[0].uncompressed_size;

    let mut out = Vec::new();
    let written = archive.decompress(0, &mut out).unwrap();
    assert_eq!(written, expected_len);
    assert_eq!(crc32fast::hash(&out), expected_crc);
}

#[test]
fn test_store_crc_mismatch() {
    let entry = RawZipEntry {
        crc: 0xDEAD_BEEF,
        ..RawZipEntry::file("bad.txt", b"corrupted?")
    };
    let data = raw_zip(&[entry], b"");

    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    let err = archive.decompress(0, &mut Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::ChecksumMismatch { expected: 0xDEAD_BEEF, .. }
    ));
}

#[test]
fn test_impossible_toc_rejected() {
    let mut data = Vec::new();
    common::eocd(&mut data, 60_000, 0, 0);
    let err = ZipArchive::new(Cursor::new(data)).unwrap_err();
    match err {
        ExtractionError::InvalidArchive(message) => {
            assert!(message.contains("impossible 60000 files"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_traversal_entries_skipped() {
    let temp = TempDir::new().unwrap();
    let data = raw_zip(
        &[
            RawZipEntry::file("../../evil.txt", b"evil"),
            RawZipEntry::file("/abs.txt", b"abs"),
            RawZipEntry::file("C:\\drive.txt", b"drive"),
            RawZipEntry::file("ok/file.txt", b"ok"),
        ],
        b"",
    );
    let archive = write_archive(temp.path(), "slip.zip", &data);
    let out = temp.path().join("nested").join("out");

    let report = extract_archive(&archive, &out, &quiet()).unwrap();
    assert_eq!(report.files_extracted, 1);
    assert_eq!(report.files_skipped, 3);
    assert!(!temp.path().join("evil.txt").exists());
    assert!(!temp.path().join("nested").join("evil.txt").exists());
    assert_eq!(fs::read(out.join("ok/file.txt")).unwrap(), b"ok");
}

#[test]
fn test_sfx_stub_prefix() {
    let temp = TempDir::new().unwrap();
    let mut stub = b"MZ".to_vec();
    stub.resize(700, 0x90);
    let data = raw_zip(&[RawZipEntry::file("setup.ini", b"[setup]")], &stub);

    let mut archive = ZipArchive::new(Cursor::new(data.clone())).unwrap();
    assert_eq!(archive.base_offset(), 700);
    let mut out = Vec::new();
    archive.decompress(0, &mut out).unwrap();
    assert_eq!(out, b"[setup]");

    let path = write_archive(temp.path(), "setup.zip", &data[700..]);
    let report = extract_archive(&path, temp.path().join("out"), &quiet()).unwrap();
    assert_eq!(report.files_extracted, 1);
}

#[test]
fn test_existing_file_respects_overwrite() {
    let temp = TempDir::new().unwrap();
    let data = common::zip_of(&[("same.txt", b"v1")]);
    let archive = write_archive(temp.path(), "a.zip", &data);
    let out = temp.path().join("out");

    extract_archive(&archive, &out, &quiet()).unwrap();
    let err = extract_archive(&archive, &out, &quiet()).unwrap_err();
    assert!(matches!(err, ExtractionError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));

    let report = extract_archive(&archive, &out, &quiet().with_overwrite(true)).unwrap();
    assert_eq!(report.files_extracted, 1);
    assert_eq!(fs::read(out.join("same.txt")).unwrap(), b"v1");
}

#[test]
fn test_encrypted_entry_rejected() {
    let entry = RawZipEntry {
        flags: 0x0001,
        ..RawZipEntry::file("secret.txt", b"xxxxxxxxxxxx")
    };
    let data = raw_zip(&[entry], b"");
    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    assert!(archive.entries()[0].is_encrypted());
    assert!(matches!(
        archive.decompress(0, &mut Vec::new()).unwrap_err(),
        ExtractionError::Encrypted { .. }
    ));
}

#[test]
fn test_cp437_name_decoded() {
    let entry = RawZipEntry {
        name: b"caf\x82.txt".to_vec(),
        ..RawZipEntry::file("placeholder", b"x")
    };
    let data = raw_zip(&[entry], b"");
    let archive = ZipArchive::new(Cursor::new(data)).unwrap();
    assert_eq!(archive.entries()[0].name, "café.txt");
}
