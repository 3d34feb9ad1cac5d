// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow};
use diagnostics::log_info;
use dirtable::SessionConfig;

use crate::common::Context;

/// Write the session configuration and bootstrap an empty catalog
pub fn init_command(ctx: &Context, data_dir: Option<PathBuf>, out: &mut dyn Write) -> Result<()> {
    let home = ctx.home()?;
    let config_path = ctx.config_path()?;
    if config_path.exists() {
        return Err(anyhow!("dirtable home already initialized at {}", home.display()));
    }

    let data_dir = data_dir.unwrap_or_else(|| home.join("data"));
    std::fs::create_dir_all(&home)
        .with_context(|| format!("Failed to create {}", home.display()))?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let config = SessionConfig::new(data_dir);
    std::fs::write(&config_path, config.to_yaml()?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let session = ctx.without_user().open_session()?;
    let system_id = session.catalog().read(|data| data.system_id.clone());
    log_info!("Initialized dirtable home {home}", home: home.display().to_string());

    writeln!(out, "Initialized {} (catalog {system_id})", home.display())?;
    Ok(())
}
