// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Session configuration, loadable from YAML

use crate::error::Result;
use fileam::{DEFAULT_TABLESPACE_OID, Oid};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Block size of the ingest copy loop
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 4096;

/// Oid of the database a session attaches to unless configured
pub const DEFAULT_DATABASE_ID: Oid = Oid(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Root of the local file areas (`base/`, `pg_tblspc/`)
    pub data_dir: PathBuf,

    #[serde(default = "default_database_id")]
    pub database_id: Oid,

    /// The database's own tablespace; relations placed here skip the
    /// CREATE privilege check
    #[serde(default = "default_database_tablespace")]
    pub database_tablespace: Oid,

    /// Tablespace name for permanent relations created without one
    #[serde(default)]
    pub default_tablespace: Option<String>,

    /// Tablespace name for temporary relations created without one
    #[serde(default)]
    pub temp_tablespace: Option<String>,

    /// Role name the session runs as
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    #[serde(default = "default_remote_block_size")]
    pub remote_block_size: usize,
}

fn default_database_id() -> Oid {
    DEFAULT_DATABASE_ID
}

fn default_database_tablespace() -> Oid {
    DEFAULT_TABLESPACE_OID
}

fn default_user() -> String {
    crate::catalog::BOOTSTRAP_SUPERUSER_NAME.to_string()
}

fn default_copy_buffer_size() -> usize {
    DEFAULT_COPY_BUFFER_SIZE
}

fn default_remote_block_size() -> usize {
    fileam::dfs::DEFAULT_BLOCK_SIZE
}

impl SessionConfig {
    /// Defaults for a data directory, running as the bootstrap superuser
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            database_id: default_database_id(),
            database_tablespace: default_database_tablespace(),
            default_tablespace: None,
            temp_tablespace: None,
            user: default_user(),
            copy_buffer_size: default_copy_buffer_size(),
            remote_block_size: default_remote_block_size(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::error::DirTableError::store(path, e))?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}
