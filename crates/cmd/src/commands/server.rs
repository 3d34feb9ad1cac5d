// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Storage servers and user mappings

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::common::{Context, read_options};

pub fn server_create_command(
    ctx: &Context,
    name: &str,
    options_file: Option<&Path>,
    if_not_exists: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let options = read_options(options_file)?;
    let created = ctx.in_transaction(|txn| Ok(txn.create_storage_server(name, &options, if_not_exists)?))?;
    match created {
        Some(oid) => writeln!(out, "Created storage server {name} ({oid})")?,
        None => writeln!(out, "Storage server {name} already exists, skipping")?,
    }
    Ok(())
}

pub fn server_drop_command(ctx: &Context, name: &str, if_exists: bool, out: &mut dyn Write) -> Result<()> {
    if ctx.in_transaction(|txn| Ok(txn.drop_storage_server(name, if_exists)?))? {
        writeln!(out, "Dropped storage server {name}")?;
    }
    Ok(())
}

pub fn server_list_command(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let servers = ctx.in_transaction(|txn| Ok(txn.list_storage_servers()))?;
    for server in servers {
        let protocol = server.options.get("protocol").map_or("?", String::as_str);
        writeln!(out, "{:<20} {:>6} {protocol}", server.name, server.oid.to_string())?;
    }
    Ok(())
}

pub fn user_mapping_create_command(
    ctx: &Context,
    server: &str,
    user: Option<&str>,
    options_file: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    let options = read_options(options_file)?;
    let oid = ctx.in_transaction(|txn| Ok(txn.create_user_mapping(server, user, &options)?))?;
    writeln!(
        out,
        "Created user mapping for {} on {server} ({oid})",
        user.unwrap_or("PUBLIC")
    )?;
    Ok(())
}

pub fn user_mapping_alter_command(
    ctx: &Context,
    server: &str,
    user: Option<&str>,
    options_file: Option<&Path>,
    out: &mut dyn Write,
) -> Result<()> {
    let options = read_options(options_file)?;
    let _ = ctx.in_transaction(|txn| Ok(txn.alter_user_mapping(server, user, &options)?))?;
    writeln!(out, "Altered user mapping for {} on {server}", user.unwrap_or("PUBLIC"))?;
    Ok(())
}

pub fn user_mapping_drop_command(
    ctx: &Context,
    server: &str,
    user: Option<&str>,
    if_exists: bool,
    out: &mut dyn Write,
) -> Result<()> {
    if ctx.in_transaction(|txn| Ok(txn.drop_user_mapping(server, user, if_exists)?))? {
        writeln!(out, "Dropped user mapping for {} on {server}", user.unwrap_or("PUBLIC"))?;
    }
    Ok(())
}
