// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;

use crate::common::Context;

pub fn role_create_command(ctx: &Context, name: &str, superuser: bool, out: &mut dyn Write) -> Result<()> {
    let oid = ctx.in_transaction(|txn| Ok(txn.create_role(name, superuser)?))?;
    writeln!(out, "Created role {name} ({oid})")?;
    Ok(())
}
