// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use dirtable::CreateTablespaceStmt;

use crate::common::{Context, read_options};

/// Arguments of `tablespace create`
#[derive(Debug, Default)]
pub struct TablespaceCreate<'a> {
    pub name: &'a str,
    pub location: &'a str,
    pub owner: Option<&'a str>,
    pub server: Option<&'a str>,
    pub handler: Option<&'a str>,
    pub options_file: Option<&'a Path>,
}

pub fn tablespace_create_command(ctx: &Context, args: &TablespaceCreate<'_>, out: &mut dyn Write) -> Result<()> {
    let mut stmt = CreateTablespaceStmt::new(args.name, args.location);
    stmt.options = read_options(args.options_file)?;
    stmt.owner = args.owner.map(str::to_string);
    stmt.file_handler = args.handler.map(str::to_string);
    if let Some(server) = args.server {
        stmt = stmt.on_server(server);
    }

    let oid = ctx.in_transaction(|txn| Ok(txn.create_tablespace(&stmt)?))?;
    writeln!(out, "Created tablespace {} ({oid})", args.name)?;
    Ok(())
}

pub fn tablespace_drop_command(ctx: &Context, name: &str, if_exists: bool, out: &mut dyn Write) -> Result<()> {
    if ctx.in_transaction(|txn| Ok(txn.drop_tablespace(name, if_exists)?))? {
        writeln!(out, "Dropped tablespace {name}")?;
    }
    Ok(())
}

pub fn tablespace_grant_command(ctx: &Context, name: &str, role: &str, out: &mut dyn Write) -> Result<()> {
    ctx.in_transaction(|txn| Ok(txn.grant_tablespace_create(name, role)?))?;
    writeln!(out, "Granted CREATE on tablespace {name} to {role}")?;
    Ok(())
}

pub fn tablespace_list_command(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let rows = ctx.in_transaction(|txn| {
        let tablespaces = txn.list_tablespaces();
        Ok(txn.catalog().read(|data| {
            tablespaces
                .into_iter()
                .map(|spc| {
                    let owner = data.role_name(spc.owner);
                    (spc, owner)
                })
                .collect::<Vec<_>>()
        }))
    })?;

    for (spc, owner) in rows {
        let kind = if spc.is_dfs() { "dfs" } else { "local" };
        let location = if spc.location.is_empty() { "-" } else { spc.location.as_str() };
        writeln!(
            out,
            "{:<20} {:>6} {:<5} {:<12} {location}",
            spc.name,
            spc.oid.to_string(),
            kind,
            owner
        )?;
    }
    Ok(())
}
