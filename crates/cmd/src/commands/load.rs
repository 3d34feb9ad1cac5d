// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Bulk loading of host files into a directory table
//!
//! A load is one transaction. Each file is copied inside its own savepoint,
//! so a file that fails half way is rolled back (and its partial copy
//! removed) while the files before it stay. With `--stop-on-error` the first
//! failure aborts the whole load instead.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use diagnostics::{log_debug, log_info, log_warn};
use dirtable::{DirectoryRow, Transaction};
use fileam::Oid;

use crate::common::{Context, format_file_size};

const LOAD_SAVEPOINT: &str = "load_file";

#[derive(Debug, Default, Clone)]
pub struct LoadOptions<'a> {
    /// Directory inside the table the files land under
    pub dest_path: Option<&'a str>,
    pub tag: Option<&'a str>,
    pub stop_on_error: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub bytes: i64,
    pub failed: usize,
}

/// A host file and the name it gets relative to the destination
#[derive(Debug)]
struct Source {
    path: PathBuf,
    name: String,
}

pub fn load_command(
    ctx: &Context,
    table: &str,
    source: &Path,
    options: &LoadOptions<'_>,
    out: &mut dyn Write,
) -> Result<LoadSummary> {
    let (sources, walk_failures) = collect_sources(source, options.stop_on_error)?;
    log_debug!("Loading {count} files from {source} into {table}",
               count: sources.len(), source: source.display().to_string(), table: table.to_string());

    let summary = ctx.in_transaction(|txn| {
        let rel = txn.relation_oid(table)?;
        let mut summary = LoadSummary {
            failed: walk_failures,
            ..LoadSummary::default()
        };

        for source in &sources {
            let name = destination(options.dest_path, &source.name);
            txn.savepoint(LOAD_SAVEPOINT)?;
            match load_one(txn, rel, &source.path, &name, options.tag) {
                Ok(row) => {
                    txn.release_savepoint(LOAD_SAVEPOINT)?;
                    summary.loaded += 1;
                    summary.bytes += row.size;
                }
                Err(err) => {
                    txn.rollback_to_savepoint(LOAD_SAVEPOINT)?;
                    txn.release_savepoint(LOAD_SAVEPOINT)?;
                    if options.stop_on_error {
                        return Err(err);
                    }
                    log_warn!("Skipping {path}: {error}",
                              path: source.path.display().to_string(), error: format!("{err:#}"));
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    })?;

    log_info!("Loaded {loaded} files into {table}, {failed} failed",
              loaded: summary.loaded, table: table.to_string(), failed: summary.failed);
    writeln!(
        out,
        "Loaded {} files ({}) into {table}, {} failed",
        summary.loaded,
        format_file_size(summary.bytes),
        summary.failed
    )?;
    Ok(summary)
}

fn load_one(
    txn: &mut Transaction<'_>,
    rel: Oid,
    path: &Path,
    name: &str,
    tag: Option<&str>,
) -> Result<DirectoryRow> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    txn.copy_from(rel, name, &mut file, tag)
        .with_context(|| format!("Failed to load {}", path.display()))
}

/// Files under `source` in name order. Directory entries that cannot be
/// read are counted unless `stop_on_error` turns them into an error.
fn collect_sources(source: &Path, stop_on_error: bool) -> Result<(Vec<Source>, usize)> {
    let meta = std::fs::metadata(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    if meta.is_file() {
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("{} has no file name", source.display()))?;
        return Ok((
            vec![Source {
                path: source.to_path_buf(),
                name,
            }],
            0,
        ));
    }

    let mut sources = Vec::new();
    let mut failures = 0;
    let walker = walkdir::WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if stop_on_error {
                    return Err(anyhow!("Failed to walk {}: {err}", source.display()));
                }
                log_warn!("Skipping unreadable entry: {error}", error: err.to_string());
                failures += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        sources.push(Source {
            path: entry.into_path(),
            name,
        });
    }
    Ok((sources, failures))
}

fn destination(dest_path: Option<&str>, name: &str) -> String {
    match dest_path.map(|dest| dest.trim_matches('/')) {
        Some(dest) if !dest.is_empty() => format!("{dest}/{name}"),
        _ => name.to_string(),
    }
}
