mod common;

use common::logs::CapturedLogs;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::Level;
use txr::{archive, Archiver, Error, HashAlgo, SENTINEL};

fn sample_root(temp: &TempDir) -> PathBuf {
    let root = temp.path().join("site");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), "hi").unwrap();
    fs::write(root.join("sub/b.txt"), "there").unwrap();
    root
}

fn sample_files(root: &Path) -> Vec<PathBuf> {
    vec![root.join("a.txt"), root.join("sub/b.txt")]
}

#[test]
fn test_archive_two_files() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let index_path = temp.path().join("out.txr");
    let data_path = temp.path().join("out.txd");

    let archived = Archiver::new()
        .archive(&root, &sample_files(&root), Some(&index_path), Some(&data_path))
        .unwrap();

    let data = fs::read(&data_path).unwrap();
    let expected = format!("hi{}there{}", SENTINEL, SENTINEL);
    assert_eq!(data, expected.as_bytes());

    let entries = &archived.index.entries;
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].idx, 0);
    assert_eq!(entries[0].filename, "a.txt");
    assert_eq!(entries[0].offset, 0);
    assert_eq!(entries[0].filesize, 2);
    assert_eq!(
        entries[0].hash,
        "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
    );

    assert_eq!(entries[1].idx, 1);
    assert_eq!(entries[1].filename, "sub/b.txt");
    assert_eq!(entries[1].offset, 2 + SENTINEL.len() as u64);
    assert_eq!(entries[1].filesize, 5);
    assert_eq!(entries[1].hash, hex::encode(Sha256::digest(b"there")));

    let header = &archived.index.header;
    assert_eq!(header.file_count, 2);
    assert_eq!(header.total_bytes, data.len() as u64);
    assert_eq!(header.sentinel, SENTINEL);
    assert_eq!(header.hash, HashAlgo::Sha256);
}

#[test]
fn test_offsets_are_cumulative() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    fs::create_dir(&root).unwrap();
    let mut files = Vec::new();
    for (i, size) in [0usize, 1, 100, 4096, 7].iter().enumerate() {
        let path = root.join(format!("f{}.bin", i));
        fs::write(&path, vec![i as u8; *size]).unwrap();
        files.push(path);
    }

    let archived = Archiver::new()
        .write_index(false)
        .write_data(false)
        .archive(&root, &files, None, None)
        .unwrap();

    let entries = &archived.index.entries;
    assert_eq!(entries[0].offset, 0);
    for pair in entries.windows(2) {
        assert_eq!(
            pair[1].offset,
            pair[0].offset + pair[0].filesize + SENTINEL.len() as u64
        );
    }
    archived.index.validate().unwrap();
}

#[test]
fn test_index_file_layout() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let archived = archive(&root, &sample_files(&root)).unwrap();

    let text = fs::read_to_string(&archived.index_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        r#"{"txr_ver":"1.0.0","txr_fmt":1,"sentinel":"!@#$!@#$!@#$","files":2,"total_bytes":31}"#
    );
    assert_eq!(lines.next().unwrap(), "idx,sha256,offset,filesize,filename");
    assert!(lines.next().unwrap().ends_with(",0,2,a.txt"));
    assert!(lines.next().unwrap().ends_with(",14,5,sub/b.txt"));
    assert!(lines.next().is_none());
}

#[test]
fn test_default_paths_beside_root() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);

    let archived = archive(&root, &sample_files(&root)).unwrap();

    assert_eq!(archived.index_path, temp.path().join("site.txr"));
    assert_eq!(archived.data_path, temp.path().join("site.txd"));
    assert!(archived.index_path.is_file());
    assert!(archived.data_path.is_file());
}

#[test]
fn test_default_paths_ignore_trailing_separator() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let with_slash = PathBuf::from(format!("{}/", root.display()));

    let archived = archive(&with_slash, &sample_files(&root)).unwrap();

    assert_eq!(archived.index_path, temp.path().join("site.txr"));
}

#[test]
fn test_relative_names_accepted() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let files = vec![PathBuf::from("sub/b.txt"), PathBuf::from("./a.txt")];

    let archived = Archiver::new()
        .write_index(false)
        .write_data(false)
        .archive(&root, &files, None, None)
        .unwrap();

    let names: Vec<&str> = archived
        .index
        .entries
        .iter()
        .map(|e| e.filename.as_str())
        .collect();
    assert_eq!(names, vec!["sub/b.txt", "a.txt"]);
}

#[test]
fn test_empty_input_rejected() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);

    let err = archive(&root, &[]).unwrap_err();
    assert!(matches!(err, Error::EmptyInput));
    assert!(!temp.path().join("site.txd").exists());
}

#[test]
fn test_file_outside_root_rejected() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let outside = temp.path().join("outside.txt");
    fs::write(&outside, "nope").unwrap();

    let err = archive(&root, &[root.join("a.txt"), outside]).unwrap_err();
    assert!(matches!(err, Error::Path { .. }));
    assert!(!temp.path().join("site.txd").exists());
}

#[test]
fn test_parent_traversal_rejected() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    fs::write(temp.path().join("outside.txt"), "nope").unwrap();

    let err = archive(&root, &[root.join("../outside.txt")]).unwrap_err();
    assert!(matches!(err, Error::Path { .. }));
}

#[test]
fn test_duplicate_file_rejected() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let files = vec![root.join("a.txt"), PathBuf::from("a.txt")];

    let err = archive(&root, &files).unwrap_err();
    match err {
        Error::Path { reason, .. } => assert_eq!(reason, "duplicate filename"),
        other => panic!("Expected path error, got {:?}", other),
    }
}

#[test]
fn test_missing_input_is_io_error() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);

    let err = archive(&root, &[root.join("missing.txt")]).unwrap_err();
    match err {
        Error::Io { path, .. } => assert_eq!(path, root.join("missing.txt")),
        other => panic!("Expected I/O error, got {:?}", other),
    }
}

#[test]
fn test_dry_run_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);

    let archived = Archiver::new()
        .write_index(false)
        .write_data(false)
        .archive(&root, &sample_files(&root), None, None)
        .unwrap();

    assert!(!archived.index_path.exists());
    assert!(!archived.data_path.exists());
    assert_eq!(archived.index.header.total_bytes, 31);
}

#[test]
fn test_output_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let files = sample_files(&root);

    let first = temp.path().join("first");
    let second = temp.path().join("second");
    for out in [&first, &second] {
        Archiver::new()
            .archive(
                &root,
                &files,
                Some(&out.with_extension("txr")),
                Some(&out.with_extension("txd")),
            )
            .unwrap();
    }

    assert_eq!(
        fs::read(first.with_extension("txr")).unwrap(),
        fs::read(second.with_extension("txr")).unwrap()
    );
    assert_eq!(
        fs::read(first.with_extension("txd")).unwrap(),
        fs::read(second.with_extension("txd")).unwrap()
    );
}

#[test]
fn test_blake3_recorded_in_index() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);

    let archived = Archiver::new()
        .hash(HashAlgo::Blake3)
        .archive(&root, &sample_files(&root), None, None)
        .unwrap();

    let text = fs::read_to_string(&archived.index_path).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().contains(r#""hash":"blake3""#));
    assert_eq!(lines.next().unwrap(), "idx,blake3,offset,filesize,filename");
    assert_eq!(
        archived.index.entries[0].hash,
        blake3::hash(b"hi").to_hex().to_string()
    );
}

#[test]
fn test_archive_dir_uses_pattern() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    fs::write(root.join("skip.md"), "# skipped").unwrap();

    let archived = Archiver::new()
        .archive_dir(&root, "**/*.txt", None, None)
        .unwrap();

    let names: Vec<&str> = archived
        .index
        .entries
        .iter()
        .map(|e| e.filename.as_str())
        .collect();
    assert_eq!(names, vec!["a.txt", "sub/b.txt"]);
}

#[cfg(unix)]
#[test]
fn test_symlink_escaping_root_rejected() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let outside = temp.path().join("outside");
    fs::create_dir(&outside).unwrap();
    fs::write(outside.join("secret.txt"), "secret").unwrap();
    std::os::unix::fs::symlink(&outside, root.join("linked")).unwrap();

    let err = archive(&root, &[root.join("a.txt"), root.join("linked/secret.txt")]).unwrap_err();

    match err {
        Error::Path { reason, .. } => assert_eq!(reason, "resolves outside archive root"),
        other => panic!("Expected path error, got {:?}", other),
    }
    assert!(!temp.path().join("site.txd").exists());
}

#[cfg(unix)]
#[test]
fn test_symlink_within_root_accepted() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    std::os::unix::fs::symlink(root.join("sub"), root.join("alias")).unwrap();

    let archived = archive(&root, &[root.join("alias/b.txt")]).unwrap();

    assert_eq!(archived.index.entries[0].filename, "alias/b.txt");
    assert_eq!(archived.index.entries[0].filesize, 5);
}

#[test]
fn test_injected_dispatch_logs_entries() {
    let temp = TempDir::new().unwrap();
    let root = sample_root(&temp);
    let logs = CapturedLogs::default();

    Archiver::new()
        .dispatch(logs.dispatch(Level::DEBUG))
        .archive(&root, &sample_files(&root), None, None)
        .unwrap();

    let output = logs.contents();
    let entries: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("DEBUG") && line.contains(" entry "))
        .collect();
    assert_eq!(entries.len(), 2, "{}", output);
    assert!(entries[0].contains("filename=a.txt"), "{}", entries[0]);
    assert!(entries[1].contains("filename=sub/b.txt"), "{}", entries[1]);
    assert!(
        output
            .lines()
            .any(|line| line.contains("INFO") && line.contains("archive header")),
        "{}",
        output
    );
}
