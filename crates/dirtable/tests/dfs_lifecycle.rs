// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Directory tables in DFS tablespaces, over an in-memory object store

use dirtable::{CreateDirectoryTableStmt, CreateTablespaceStmt, MemoryStore, Session, SessionConfig};
use fileam::dfs::{BuilderConnector, MemoryConnector};
use fileam::{BackendKind, ErrorKind, OpenFlags};
use object_store::ObjectStore;
use object_store::path::Path;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Fixture {
    _dir: tempfile::TempDir,
    connector: Arc<MemoryConnector>,
    session: Session,
}

fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// A session with server `s1`, a PUBLIC mapping and tablespace `remote`
/// at `/bucket/work`
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(MemoryConnector::new());
    let mut session = Session::open(
        SessionConfig::new(dir.path().join("data")),
        Box::new(MemoryStore::new()),
        connector.clone(),
    )
    .unwrap();

    let txn = session.begin().unwrap();
    let _ = txn
        .create_storage_server("s1", &options(&[("protocol", "memory")]), false)
        .unwrap();
    let _ = txn.create_user_mapping("s1", None, &BTreeMap::new()).unwrap();
    let _ = txn
        .create_tablespace(&CreateTablespaceStmt::new("remote", "/bucket/work/").on_server("s1"))
        .unwrap();
    txn.commit().unwrap();

    Fixture {
        _dir: dir,
        connector,
        session,
    }
}

/// Borrows only the connector, so it can be used while a transaction
/// holds `fx.session` mutably
fn object_exists_in(connector: &MemoryConnector, path: &str) -> bool {
    let store = connector.store();
    futures::executor::block_on(store.head(&Path::from(path))).is_ok()
}

impl Fixture {
    fn object_exists(&self, path: &str) -> bool {
        object_exists_in(&self.connector, path)
    }

    fn object_bytes(&self, path: &str) -> Vec<u8> {
        let store = self.connector.store();
        futures::executor::block_on(async {
            store
                .get(&Path::from(path))
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap()
                .to_vec()
        })
    }
}

#[test]
fn test_dfs_tablespace_row() {
    let mut fx = fixture();
    let txn = fx.session.begin().unwrap();
    let spc = txn
        .list_tablespaces()
        .into_iter()
        .find(|row| row.name == "remote")
        .unwrap();
    assert_eq!(spc.location, "/bucket/work");
    assert!(spc.is_dfs());
    assert_eq!(spc.file_handler.as_deref(), Some(fileam::DEFAULT_FILE_HANDLER));

    let am = txn.resolver().get(spc.oid).unwrap();
    assert_eq!(am.kind(), BackendKind::Dfs);
}

#[test]
fn test_remote_ingest_and_read_back() {
    let mut fx = fixture();
    let mut txn = fx.session.begin().unwrap();
    let rel = txn
        .create_directory_table(&CreateDirectoryTableStmt::new("t", "/in/").in_tablespace("remote"))
        .unwrap();
    let row = txn.copy_from(rel, "a.bin", &mut &b"remote bytes"[..], None).unwrap();
    assert_eq!(row.scoped_file_url, "/remote/in/a.bin");
    assert_eq!(txn.remote_handles().len(), 0);
    txn.commit().unwrap();

    assert_eq!(fx.object_bytes("bucket/work/in/a.bin"), b"remote bytes");
    assert_eq!(fx.session.remote_handles().leak_count(), 0);

    let txn = fx.session.begin().unwrap();
    assert_eq!(txn.file_content("/remote/in/a.bin").unwrap(), b"remote bytes");
    assert_eq!(fx.connector.connects(), 1);
}

#[test]
fn test_remote_abort_removes_object() {
    let mut fx = fixture();
    let rel = {
        let mut txn = fx.session.begin().unwrap();
        let rel = txn
            .create_directory_table(&CreateDirectoryTableStmt::new("t", "in").in_tablespace("remote"))
            .unwrap();
        txn.commit().unwrap();
        rel
    };

    let mut txn = fx.session.begin().unwrap();
    let _ = txn.copy_from(rel, "gone", &mut &b"x"[..], None).unwrap();
    assert!(object_exists_in(&fx.connector, "bucket/work/in/gone"));
    txn.abort();
    assert!(!fx.object_exists("bucket/work/in/gone"));
}

#[test]
fn test_remote_drop_removes_prefix_at_commit() {
    let mut fx = fixture();
    let mut txn = fx.session.begin().unwrap();
    let rel = txn
        .create_directory_table(&CreateDirectoryTableStmt::new("t", "in").in_tablespace("remote"))
        .unwrap();
    let _ = txn.copy_from(rel, "a", &mut &b"a"[..], None).unwrap();
    let _ = txn.copy_from(rel, "deep/b", &mut &b"b"[..], None).unwrap();
    txn.commit().unwrap();

    let mut txn = fx.session.begin().unwrap();
    assert!(txn.drop_directory_table("t", false).unwrap());
    txn.commit().unwrap();
    assert!(!fx.object_exists("bucket/work/in/a"));
    assert!(!fx.object_exists("bucket/work/in/deep/b"));
}

/// Table `t` at `in` in `remote` holding one committed file
fn remote_table_with_file(fx: &mut Fixture) {
    let mut txn = fx.session.begin().unwrap();
    let rel = txn
        .create_directory_table(&CreateDirectoryTableStmt::new("t", "in").in_tablespace("remote"))
        .unwrap();
    let _ = txn.copy_from(rel, "a", &mut &b"a"[..], None).unwrap();
    txn.commit().unwrap();
    assert!(fx.object_exists("bucket/work/in/a"));
}

#[test]
fn test_drop_table_then_its_tablespace_and_mapping_in_one_transaction() {
    let mut fx = fixture();
    remote_table_with_file(&mut fx);

    let mut txn = fx.session.begin().unwrap();
    let spc = txn.tablespace_oid("remote").unwrap();
    assert!(txn.drop_directory_table("t", false).unwrap());
    assert!(txn.drop_tablespace("remote", false).unwrap());
    assert!(txn.drop_user_mapping("s1", None, false).unwrap());
    assert!(!txn.resolver().is_cached(spc));
    assert!(!txn.connections().is_cached("s1", "/bucket/work"));
    txn.commit().unwrap();

    assert!(!fx.object_exists("bucket/work/in/a"));
    assert_eq!(fx.connector.connects(), 1);
}

#[test]
fn test_pending_drop_keeps_its_connection_across_invalidations() {
    let mut fx = fixture();
    remote_table_with_file(&mut fx);
    assert_eq!(fx.connector.connects(), 1);

    let mut txn = fx.session.begin().unwrap();
    let spc = txn.tablespace_oid("remote").unwrap();
    assert!(txn.drop_directory_table("t", false).unwrap());
    let _ = txn
        .alter_tablespace_options("remote", &options(&[("seq_page_cost", "2")]), false)
        .unwrap();
    let _ = txn
        .alter_user_mapping("s1", None, &options(&[("region", "eu-west-1")]))
        .unwrap();
    assert!(!txn.resolver().is_cached(spc));
    assert!(!txn.connections().is_cached("s1", "/bucket/work"));
    txn.commit().unwrap();

    assert!(!fx.object_exists("bucket/work/in/a"));
    assert_eq!(fx.connector.connects(), 1);
}

#[test]
fn test_open_handle_at_abort_closes_without_leak() {
    let mut fx = fixture();
    let txn = fx.session.begin().unwrap();
    let spc = txn.tablespace_oid("remote").unwrap();
    let am = txn.resolver().get(spc).unwrap();
    let file = am
        .open(spc, "/loose/handle", OpenFlags::CREAT | OpenFlags::WRONLY)
        .unwrap();
    assert_eq!(txn.remote_handles().len(), 1);
    txn.abort();

    assert_eq!(fx.session.remote_handles().len(), 0);
    assert_eq!(fx.session.remote_handles().leak_count(), 0);
    drop(file);
    assert!(!fx.object_exists("bucket/work/loose/handle"));
}

#[test]
fn test_open_handle_at_commit_is_a_leak() {
    let mut fx = fixture();
    let txn = fx.session.begin().unwrap();
    let spc = txn.tablespace_oid("remote").unwrap();
    let am = txn.resolver().get(spc).unwrap();
    let file = am
        .open(spc, "/loose/commit", OpenFlags::CREAT | OpenFlags::WRONLY)
        .unwrap();
    txn.commit().unwrap();

    assert_eq!(fx.session.remote_handles().len(), 0);
    assert_eq!(fx.session.remote_handles().leak_count(), 1);
    drop(file);
}

#[test]
fn test_savepoint_release_closes_its_handles() {
    let mut fx = fixture();
    let mut txn = fx.session.begin().unwrap();
    let spc = txn.tablespace_oid("remote").unwrap();
    txn.savepoint("s1").unwrap();
    let am = txn.resolver().get(spc).unwrap();
    let _file = am.open(spc, "/sub/x", OpenFlags::CREAT | OpenFlags::WRONLY).unwrap();
    txn.rollback_to_savepoint("s1").unwrap();
    assert_eq!(txn.remote_handles().len(), 0);
    assert_eq!(txn.remote_handles().leak_count(), 0);
}

#[test]
fn test_mapping_change_reconnects() {
    let mut fx = fixture();
    {
        let txn = fx.session.begin().unwrap();
        let _ = txn.file_content("/remote/missing").unwrap_err();
        txn.commit().unwrap();
    }
    assert_eq!(fx.connector.connects(), 1);

    let txn = fx.session.begin().unwrap();
    let _ = txn
        .alter_user_mapping("s1", None, &options(&[("region", "eu-west-1")]))
        .unwrap();
    txn.commit().unwrap();

    let txn = fx.session.begin().unwrap();
    let _ = txn.file_content("/remote/missing").unwrap_err();
    assert_eq!(fx.connector.connects(), 2);
}

#[test]
fn test_server_and_mapping_commands() {
    let mut fx = fixture();
    let txn = fx.session.begin().unwrap();

    let err = txn
        .create_storage_server("s1", &options(&[("protocol", "memory")]), false)
        .unwrap_err();
    assert_eq!(err.to_string(), "storage server \"s1\" already exists");
    assert_eq!(
        txn.create_storage_server("s1", &options(&[("protocol", "memory")]), true)
            .unwrap(),
        None
    );

    let err = txn
        .create_storage_server("s2", &options(&[("endpoint", "x")]), false)
        .unwrap_err();
    assert_eq!(err.to_string(), "option \"protocol\" not found");

    let err = txn
        .create_tablespace(&CreateTablespaceStmt::new("r2", "/b").on_server("nope"))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedObject));
    assert_eq!(err.to_string(), "server \"nope\" does not exist");

    let err = txn.drop_storage_server("s1", false).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidObjectDefinition));

    let err = txn
        .create_user_mapping("s1", None, &BTreeMap::new())
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::DuplicateObject));
    assert!(txn.drop_user_mapping("s1", None, false).unwrap());
    assert!(!txn.drop_user_mapping("s1", None, true).unwrap());
}

#[test]
fn test_missing_mapping_fails_to_resolve() {
    let mut fx = fixture();
    let mut txn = fx.session.begin().unwrap();
    assert!(txn.drop_user_mapping("s1", None, false).unwrap());
    let rel = txn
        .create_directory_table(&CreateDirectoryTableStmt::new("t", "in").in_tablespace("remote"))
        .unwrap();
    let err = txn.copy_from(rel, "a", &mut &b"a"[..], None).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedObject));
    assert_eq!(err.to_string(), "user mapping not found for \"postgres\"");
}

#[test]
fn test_unreachable_server_is_a_backend_error() {
    let mut fx = fixture();
    fx.connector.set_unavailable(true);
    let mut txn = fx.session.begin().unwrap();
    let rel = txn
        .create_directory_table(&CreateDirectoryTableStmt::new("t", "in").in_tablespace("remote"))
        .unwrap();
    let err = txn.copy_from(rel, "a", &mut &b"a"[..], None).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::FileBackend));
    assert!(err.to_string().starts_with("failed to connect to \"s1\""));
}

#[test]
fn test_exclusive_open_reports_stat_failures() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("objects");
    let mut session = Session::open(
        SessionConfig::new(dir.path().join("data")),
        Box::new(MemoryStore::new()),
        Arc::new(BuilderConnector),
    )
    .unwrap();

    let mut txn = session.begin().unwrap();
    let server_options = options(&[("protocol", "local"), ("root", root.to_str().unwrap())]);
    let _ = txn.create_storage_server("disk", &server_options, false).unwrap();
    let _ = txn.create_user_mapping("disk", None, &BTreeMap::new()).unwrap();
    let spc = txn
        .create_tablespace(&CreateTablespaceStmt::new("ondisk", "/bucket/work").on_server("disk"))
        .unwrap();
    let am = txn.resolver().get(spc).unwrap();

    let mut file = am.open(spc, "/a", OpenFlags::CREAT | OpenFlags::WRONLY).unwrap();
    let _ = file.write_all(b"plain file").unwrap();
    file.close().unwrap();
    assert!(root.join("bucket/work/a").is_file());

    // "/a" is a file, so statting "/a/b" fails with something other than
    // not-found and the open must not go ahead.
    let exclusive = OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::EXCL;
    let err = am.open(spc, "/a/b", exclusive).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileBackend);
    assert!(err.to_string().starts_with("failed to open file \"/a/b\""));
    assert!(!err.to_string().contains("already exists"));

    let err = am.open(spc, "/a", exclusive).unwrap_err();
    assert!(err.to_string().ends_with("file already exists"));

    let fresh = am.open(spc, "/c", exclusive).unwrap();
    fresh.close().unwrap();
    txn.abort();
}
