// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Tests for the local file access method.

use super::LocalFileAm;
use crate::am::FileAm;
use crate::error::ErrorKind;
use crate::types::{DEFAULT_TABLESPACE_OID, OpenFlags, Oid, RelFileNode};
use crate::wait_event::{WaitEvent, reset_wait_event_stats, wait_event_stats};
use tempfile::TempDir;

const DB: Oid = Oid(5);

fn create_am() -> (TempDir, LocalFileAm) {
    let dir = TempDir::new().expect("create temp dir");
    let am = LocalFileAm::new(dir.path().to_path_buf(), DB);
    (dir, am)
}

#[test]
fn test_default_area_layout() {
    let (dir, am) = create_am();
    let mut file = am
        .open(DEFAULT_TABLESPACE_OID, "/foo/bar/a.bin", OpenFlags::CREAT | OpenFlags::WRONLY)
        .unwrap();
    assert_eq!(file.write_all(b"0123456789").unwrap(), 10);
    file.close().unwrap();

    let host = dir.path().join("base/5/foo/bar/a.bin");
    assert_eq!(std::fs::read(host).unwrap(), b"0123456789");
}

#[test]
fn test_non_default_area_goes_through_link_dir() {
    let (dir, am) = create_am();
    let spc = Oid(16500);
    let mut file = am
        .open(spc, "t/x.txt", OpenFlags::CREAT | OpenFlags::WRONLY)
        .unwrap();
    let _ = file.write_all(b"x").unwrap();
    file.close().unwrap();

    let host = dir
        .path()
        .join("pg_tblspc/16500")
        .join(crate::TABLESPACE_VERSION_DIRECTORY)
        .join("5/t/x.txt");
    assert!(host.exists());
}

#[test]
fn test_stream_cursor_follows_positional_io() {
    let (_dir, am) = create_am();
    let mut file = am
        .open(DEFAULT_TABLESPACE_OID, "cursor.bin", OpenFlags::CREAT | OpenFlags::RDWR)
        .unwrap();
    let _ = file.write_all(b"abcdef").unwrap();
    let _ = file.pwrite(b"XY", 2).unwrap();
    // The cursor now sits after the pwrite.
    let _ = file.write(b"Z").unwrap();
    assert_eq!(file.size().unwrap(), 6);

    let mut buf = [0u8; 6];
    assert_eq!(file.pread(&mut buf, 0).unwrap(), 6);
    assert_eq!(&buf, b"abXYZf");

    let _ = file.seek(4).unwrap();
    let mut tail = [0u8; 8];
    let n = file.read(&mut tail).unwrap();
    assert_eq!(&tail[..n], b"Zf");
    // End of file.
    assert_eq!(file.read(&mut tail).unwrap(), 0);
    file.close().unwrap();
}

#[test]
fn test_open_missing_file_records_last_error() {
    let (_dir, am) = create_am();
    let err = am
        .open(DEFAULT_TABLESPACE_OID, "nope.bin", OpenFlags::RDONLY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileBackend);
    assert!(err.to_string().contains("failed to open file"));
}

#[test]
fn test_exclusive_create_refuses_existing_file() {
    let (_dir, am) = create_am();
    let flags = OpenFlags::CREAT | OpenFlags::EXCL | OpenFlags::WRONLY;
    am.open(DEFAULT_TABLESPACE_OID, "once.bin", flags)
        .unwrap()
        .close()
        .unwrap();
    assert!(am.open(DEFAULT_TABLESPACE_OID, "once.bin", flags).is_err());
}

#[test]
fn test_names_cannot_escape_the_area() {
    let (_dir, am) = create_am();
    let err = am
        .open(DEFAULT_TABLESPACE_OID, "../secret", OpenFlags::RDONLY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    assert!(am.unlink(DEFAULT_TABLESPACE_OID, "/").is_err());
}

#[test]
fn test_exists() {
    let (_dir, am) = create_am();
    assert!(!am.exists(DEFAULT_TABLESPACE_OID, "a/b.txt").unwrap());
    am.open(DEFAULT_TABLESPACE_OID, "a/b.txt", OpenFlags::CREAT | OpenFlags::WRONLY)
        .unwrap()
        .close()
        .unwrap();
    assert!(am.exists(DEFAULT_TABLESPACE_OID, "a/b.txt").unwrap());
    assert!(am.exists(DEFAULT_TABLESPACE_OID, "/a").unwrap());
}

#[test]
fn test_unlink_removes_tree_and_ignores_missing() {
    let (dir, am) = create_am();
    for name in ["t/a.txt", "t/sub/b.txt", "t/sub/deeper/c.txt"] {
        let mut file = am
            .open(DEFAULT_TABLESPACE_OID, name, OpenFlags::CREAT | OpenFlags::WRONLY)
            .unwrap();
        let _ = file.write_all(name.as_bytes()).unwrap();
        file.close().unwrap();
    }
    std::fs::create_dir_all(dir.path().join("base/5/t/empty")).unwrap();

    am.unlink(DEFAULT_TABLESPACE_OID, "/t").unwrap();
    assert!(!dir.path().join("base/5/t").exists());

    // Missing path is a no-op.
    am.unlink(DEFAULT_TABLESPACE_OID, "/t").unwrap();
    am.unlink(DEFAULT_TABLESPACE_OID, "never/was.txt").unwrap();
}

#[test]
fn test_unlink_single_file_keeps_siblings() {
    let (_dir, am) = create_am();
    for name in ["d/one", "d/two"] {
        am.open(DEFAULT_TABLESPACE_OID, name, OpenFlags::CREAT | OpenFlags::WRONLY)
            .unwrap()
            .close()
            .unwrap();
    }
    am.unlink(DEFAULT_TABLESPACE_OID, "d/one").unwrap();
    assert!(!am.exists(DEFAULT_TABLESPACE_OID, "d/one").unwrap());
    assert!(am.exists(DEFAULT_TABLESPACE_OID, "d/two").unwrap());
}

#[test]
fn test_format_file_name() {
    let (_dir, am) = create_am();
    let default = RelFileNode {
        spc_node: DEFAULT_TABLESPACE_OID,
        db_node: Oid(5),
        rel_node: Oid(42),
    };
    assert_eq!(am.format_file_name(&default, "a.bin"), "base/5/a.bin");

    let other = RelFileNode {
        spc_node: Oid(16500),
        ..default
    };
    assert_eq!(
        am.format_file_name(&other, "a.bin"),
        format!(
            "pg_tblspc/16500/{}/5/42_dirtable/a.bin",
            crate::TABLESPACE_VERSION_DIRECTORY
        )
    );
}

#[test]
fn test_io_reports_wait_events() {
    let (_dir, am) = create_am();
    reset_wait_event_stats();
    let mut file = am
        .open(DEFAULT_TABLESPACE_OID, "w.bin", OpenFlags::CREAT | OpenFlags::RDWR)
        .unwrap();
    let _ = file.write_all(b"hello").unwrap();
    let mut buf = [0u8; 5];
    let _ = file.pread(&mut buf, 0).unwrap();
    file.close().unwrap();

    assert_eq!(wait_event_stats(WaitEvent::DataFileWrite).count, 1);
    assert_eq!(wait_event_stats(WaitEvent::DataFileRead).count, 1);
}
