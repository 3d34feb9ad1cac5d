// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end command tests against a temporary home

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cmd::{Context, LoadOptions, LoadSummary, TablespaceCreate};
use fileam::dfs::MemoryConnector;
use tempfile::TempDir;

struct Home {
    dir: TempDir,
    ctx: Context,
}

impl Home {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(Some(dir.path().join("home")), None);
        let mut out = Vec::new();
        cmd::init_command(&ctx, None, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Initialized"));
        Self { dir, ctx }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn data(&self, relative: &str) -> PathBuf {
        self.path().join("home/data/base/5").join(relative)
    }

    fn source_tree(&self, files: &[(&str, &str)]) -> PathBuf {
        let root = self.path().join("source");
        for (name, content) in files {
            let path = root.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        root
    }
}

fn run(f: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
    let mut out = Vec::new();
    f(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn load(ctx: &Context, table: &str, source: &Path, options: &LoadOptions<'_>) -> anyhow::Result<LoadSummary> {
    cmd::load_command(ctx, table, source, options, &mut Vec::new())
}

#[test]
fn test_init_is_required_and_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::new(Some(dir.path().to_path_buf()), None);

    let err = cmd::table_list_command(&ctx, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("Run 'dirtable init' first"));

    cmd::init_command(&ctx, None, &mut Vec::new()).unwrap();
    assert!(dir.path().join("dirtable.yaml").exists());
    assert!(dir.path().join("catalog.json").exists());

    let err = cmd::init_command(&ctx, None, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("already initialized"));
}

#[test]
fn test_load_list_cat_remove() {
    let home = Home::new();
    let ctx = &home.ctx;
    let _ = run(|out| cmd::table_create_command(ctx, "docs", "/incoming/", None, false, out));

    let source = home.source_tree(&[("a.txt", "alpha"), ("sub/b.txt", "bravo!")]);
    let summary = load(
        ctx,
        "docs",
        &source,
        &LoadOptions {
            dest_path: Some("2025"),
            tag: Some("batch1"),
            ..LoadOptions::default()
        },
    )
    .unwrap();
    assert_eq!(
        summary,
        LoadSummary {
            loaded: 2,
            bytes: 11,
            failed: 0
        }
    );
    assert_eq!(
        std::fs::read_to_string(home.data("incoming/2025/sub/b.txt")).unwrap(),
        "bravo!"
    );

    let listing = run(|out| cmd::ls_command(ctx, "docs", out));
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("/pg_default/incoming/2025/a.txt [batch1]"));
    assert!(lines[1].contains("6B"));

    let content = run(|out| cmd::cat_command(ctx, "/pg_default/incoming/2025/a.txt", out));
    assert_eq!(content, "alpha");

    let removed = run(|out| cmd::rm_command(ctx, "docs", "incoming/2025/a.txt", out));
    assert_eq!(removed, "Removed /pg_default/incoming/2025/a.txt\n");
    assert!(!home.data("incoming/2025/a.txt").exists());
    assert_eq!(run(|out| cmd::ls_command(ctx, "docs", out)).lines().count(), 1);

    let tables = run(|out| cmd::table_list_command(ctx, out));
    assert!(tables.starts_with("docs"));
    assert!(tables.contains("incoming"));
    assert!(tables.contains("1 files"));
}

#[test]
fn test_load_skips_failures_unless_told_to_stop() {
    let home = Home::new();
    let ctx = &home.ctx;
    let _ = run(|out| cmd::table_create_command(ctx, "docs", "in", None, false, out));

    let source = home.source_tree(&[("a.txt", "first")]);
    let _ = load(ctx, "docs", &source, &LoadOptions::default()).unwrap();

    // a.txt is now a duplicate, b.txt is new
    std::fs::write(source.join("b.txt"), "second").unwrap();
    let summary = load(ctx, "docs", &source, &LoadOptions::default()).unwrap();
    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(std::fs::read_to_string(home.data("in/a.txt")).unwrap(), "first");
    assert!(home.data("in/b.txt").exists());

    std::fs::write(source.join("c.txt"), "third").unwrap();
    let strict = LoadOptions {
        stop_on_error: true,
        ..LoadOptions::default()
    };
    let err = load(ctx, "docs", &source, &strict).unwrap_err();
    assert!(format!("{err:#}").contains("already exists"));
    assert!(!home.data("in/c.txt").exists());
    assert_eq!(run(|out| cmd::ls_command(ctx, "docs", out)).lines().count(), 2);
}

#[test]
fn test_drop_table_removes_files() {
    let home = Home::new();
    let ctx = &home.ctx;
    let _ = run(|out| cmd::table_create_command(ctx, "docs", "in", None, false, out));
    let source = home.source_tree(&[("a.txt", "a")]);
    let _ = load(ctx, "docs", &source, &LoadOptions::default()).unwrap();
    assert!(home.data("in/a.txt").exists());

    let dropped = run(|out| cmd::table_drop_command(ctx, "docs", false, out));
    assert_eq!(dropped, "Dropped directory table docs\n");
    assert!(!home.data("in").exists());

    assert_eq!(run(|out| cmd::table_drop_command(ctx, "docs", true, out)), "");
    assert!(cmd::table_drop_command(ctx, "docs", false, &mut Vec::new()).is_err());
}

#[test]
fn test_tablespace_privileges_through_roles() {
    let home = Home::new();
    let ctx = &home.ctx;
    let location = home.path().join("fast");
    std::fs::create_dir_all(&location).unwrap();

    let _ = run(|out| cmd::role_create_command(ctx, "alice", false, out));
    let _ = run(|out| {
        cmd::tablespace_create_command(
            ctx,
            &TablespaceCreate {
                name: "fast",
                location: location.to_str().unwrap(),
                ..TablespaceCreate::default()
            },
            out,
        )
    });
    let listing = run(|out| cmd::tablespace_list_command(ctx, out));
    assert!(listing.lines().any(|line| line.starts_with("fast") && line.contains("local")));

    let alice = Context::new(ctx.home.clone(), Some("alice".into()));
    let err = cmd::table_create_command(&alice, "t", "in", Some("fast"), false, &mut Vec::new())
        .unwrap_err();
    assert!(err.to_string().contains("permission denied for tablespace fast"));

    let _ = run(|out| cmd::tablespace_grant_command(ctx, "fast", "alice", out));
    let _ = run(|out| cmd::table_create_command(&alice, "t", "in", Some("fast"), false, out));

    let err = cmd::tablespace_drop_command(ctx, "fast", false, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("some objects depend on it"));
    // dropping the storage needs the tablespace owner
    let err = cmd::table_drop_command(&alice, "t", false, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("must be owner of tablespace fast"));
    let _ = run(|out| cmd::table_drop_command(ctx, "t", false, out));
    assert_eq!(
        run(|out| cmd::tablespace_drop_command(ctx, "fast", false, out)),
        "Dropped tablespace fast\n"
    );
}

#[test]
fn test_dfs_tablespace_end_to_end() {
    let home = Home::new();
    let connector = Arc::new(MemoryConnector::new());
    let ctx = &home.ctx.clone().with_connector(connector.clone());

    let options = home.path().join("server.yaml");
    std::fs::write(&options, "protocol: memory\n").unwrap();
    let _ = run(|out| cmd::server_create_command(ctx, "s1", Some(&options), false, out));
    assert!(
        run(|out| cmd::server_create_command(ctx, "s1", Some(&options), true, out))
            .contains("already exists, skipping")
    );
    let _ = run(|out| cmd::user_mapping_create_command(ctx, "s1", None, None, out));
    let _ = run(|out| {
        cmd::tablespace_create_command(
            ctx,
            &TablespaceCreate {
                name: "remote",
                location: "/bucket/work",
                server: Some("s1"),
                ..TablespaceCreate::default()
            },
            out,
        )
    });
    assert!(run(|out| cmd::server_list_command(ctx, out)).contains("memory"));

    let _ = run(|out| cmd::table_create_command(ctx, "r", "landing", Some("remote"), false, out));
    let source = home.source_tree(&[("x.csv", "1,2,3\n")]);
    let summary = load(ctx, "r", &source, &LoadOptions::default()).unwrap();
    assert_eq!(summary.loaded, 1);

    assert_eq!(
        run(|out| cmd::cat_command(ctx, "/remote/landing/x.csv", out)),
        "1,2,3\n"
    );

    let err = cmd::server_drop_command(ctx, "s1", false, &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("s1"));

    let _ = run(|out| cmd::user_mapping_drop_command(ctx, "s1", None, false, out));
    let err = cmd::cat_command(ctx, "/remote/landing/x.csv", &mut Vec::new()).unwrap_err();
    assert!(err.to_string().contains("user mapping not found"));
}
