// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use diagnostics::log_debug;

use crate::common::{Context, format_file_size};

/// List the metadata rows of a directory table
pub fn ls_command(ctx: &Context, table: &str, out: &mut dyn Write) -> Result<()> {
    let rows = ctx.in_transaction(|txn| {
        let rel = txn.relation_oid(table)?;
        Ok(txn.list_files(rel)?)
    })?;

    for row in rows {
        let tag = row.tag.as_deref().map(|tag| format!(" [{tag}]")).unwrap_or_default();
        writeln!(
            out,
            "{:>8} {} {}{tag}",
            format_file_size(row.size),
            row.last_modified,
            row.scoped_file_url
        )?;
    }
    Ok(())
}

/// Write the contents of `/<tablespace>/<path>` to `out`
pub fn cat_command(ctx: &Context, scoped_url: &str, out: &mut dyn Write) -> Result<()> {
    let content = ctx.in_transaction(|txn| Ok(txn.file_content(scoped_url)?))?;
    log_debug!("cat {url}: {size} bytes", url: scoped_url.to_string(), size: content.len());
    out.write_all(&content)?;
    Ok(())
}

/// Remove a file row now and the file itself when the command commits
pub fn rm_command(ctx: &Context, table: &str, relative_path: &str, out: &mut dyn Write) -> Result<()> {
    let row = ctx.in_transaction(|txn| {
        let rel = txn.relation_oid(table)?;
        Ok(txn.remove_file(rel, relative_path)?)
    })?;
    writeln!(out, "Removed {}", row.scoped_file_url)?;
    Ok(())
}
