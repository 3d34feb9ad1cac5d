// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! What the file access methods need to read from the catalog

use crate::error::{Error, Result};
use crate::types::Oid;
use std::collections::BTreeMap;

/// Tablespace option naming the storage server of a DFS tablespace
pub const SERVER_OPTION: &str = "server";

/// Catalog view of one tablespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablespaceInfo {
    pub oid: Oid,
    pub name: String,
    pub owner: Oid,
    pub location: String,
    pub options: BTreeMap<String, String>,
    /// `"library,symbol"`; `None` selects the local backend
    pub file_handler: Option<String>,
}

impl TablespaceInfo {
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        self.options.get(SERVER_OPTION).map(String::as_str)
    }

    #[must_use]
    pub fn is_dfs(&self) -> bool {
        self.server().is_some()
    }
}

/// A storage server plus the current user's mapping to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfsServerInfo {
    pub name: String,
    pub server_options: BTreeMap<String, String>,
    pub user_options: BTreeMap<String, String>,
    /// Identity used to match user-mapping invalidations
    pub user_mapping: Oid,
}

/// Read access to the rows the backends depend on
pub trait TablespaceLookup: Send + Sync {
    fn tablespace(&self, spc: Oid) -> Result<Option<TablespaceInfo>>;

    /// Server options merged with the current user's mapping
    fn dfs_server(&self, server: &str) -> Result<DfsServerInfo>;

    fn tablespace_required(&self, spc: Oid) -> Result<TablespaceInfo> {
        self.tablespace(spc)?
            .ok_or_else(|| Error::catalog_lookup(format!("cache lookup failed for tablespace {spc}")))
    }
}
