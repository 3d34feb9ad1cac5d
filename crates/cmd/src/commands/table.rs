// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use dirtable::{CreateDirectoryTableStmt, Persistence};

use crate::common::Context;

pub fn table_create_command(
    ctx: &Context,
    name: &str,
    location: &str,
    tablespace: Option<&str>,
    temporary: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let mut stmt = CreateDirectoryTableStmt::new(name, location);
    if let Some(tablespace) = tablespace {
        stmt = stmt.in_tablespace(tablespace);
    }
    if temporary {
        stmt = stmt.temporary();
    }

    let oid = ctx.in_transaction(|txn| Ok(txn.create_directory_table(&stmt)?))?;
    writeln!(out, "Created directory table {name} ({oid})")?;
    Ok(())
}

pub fn table_drop_command(ctx: &Context, name: &str, if_exists: bool, out: &mut dyn Write) -> Result<()> {
    if ctx.in_transaction(|txn| Ok(txn.drop_directory_table(name, if_exists)?))? {
        writeln!(out, "Dropped directory table {name}")?;
    }
    Ok(())
}

pub fn table_list_command(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let rows = ctx.in_transaction(|txn| {
        let tables = txn.list_directory_tables();
        Ok(txn.catalog().read(|data| {
            tables
                .into_iter()
                .map(|(rel, table)| {
                    let tablespace = data
                        .tablespaces
                        .get(&table.tablespace)
                        .map_or_else(|| table.tablespace.to_string(), |spc| spc.name.clone());
                    let files = data.files.get(&rel.oid).map_or(0, |files| files.len());
                    (rel, table.location.unwrap_or_default(), tablespace, files)
                })
                .collect::<Vec<_>>()
        }))
    })?;

    for (rel, location, tablespace, files) in rows {
        let persistence = match rel.persistence {
            Persistence::Permanent => "",
            Persistence::Temporary => " (temporary)",
        };
        writeln!(
            out,
            "{:<20} {:<16} {location:<24} {files:>6} files{persistence}",
            rel.name, tablespace
        )?;
    }
    Ok(())
}
