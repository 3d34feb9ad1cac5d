// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Tablespace commands
//!
//! A tablespace with a `server` option is a DFS tablespace: its location is
//! `/bucket/workdir` on that storage server and its file handler defaults to
//! the DFS access method. Any other tablespace is a host directory linked
//! from `pg_tblspc/<oid>` under the data directory.

use super::{RESERVED_PREFIX, TablespaceRow};
use crate::error::{
    DirTableError, Result, duplicate_object, insufficient_privilege, invalid_object_definition,
    invalid_parameter, reserved_name, undefined_object,
};
use crate::session::Session;
use diagnostics::{log_debug, log_info};
use fileam::local::LocalFileAm;
use fileam::{
    DEFAULT_FILE_HANDLER, DEFAULT_TABLESPACE_OID, FileHandlerSpec, GLOBAL_TABLESPACE_OID,
    InvalidationEvent, Oid, SERVER_OPTION, TABLESPACE_VERSION_DIRECTORY,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Longest accepted tablespace location
pub const MAX_LOCATION_LEN: usize = 1024 - 64 - 2;

/// Options that name where a DFS tablespace lives and cannot be altered
const FIXED_OPTIONS: [&str; 3] = ["stage", SERVER_OPTION, "path"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTablespaceStmt {
    pub name: String,
    /// Owning role; the current user when absent
    pub owner: Option<String>,
    pub location: String,
    pub options: BTreeMap<String, String>,
    pub file_handler: Option<String>,
}

impl CreateTablespaceStmt {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            ..Self::default()
        }
    }

    /// Place the tablespace on a storage server
    #[must_use]
    pub fn on_server(mut self, server: impl Into<String>) -> Self {
        let _ = self.options.insert(SERVER_OPTION.to_string(), server.into());
        self
    }

    #[must_use]
    pub fn is_dfs(&self) -> bool {
        self.options.contains_key(SERVER_OPTION)
    }
}

/// Strip trailing separators, keeping a lone `/`
fn canonicalize_location(location: &str) -> String {
    let trimmed = location.trim().trim_end_matches('/');
    if trimmed.is_empty() && location.trim().starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn check_location(location: &str) -> Result<()> {
    if !location.starts_with('/') {
        return Err(invalid_object_definition(
            "tablespace location must be an absolute path",
        ));
    }
    if location == "/" {
        return Err(invalid_object_definition(
            "root directory can't be used as location",
        ));
    }
    if location.len() > MAX_LOCATION_LEN {
        return Err(invalid_object_definition(format!(
            "tablespace location \"{location}\" is too long"
        )));
    }
    Ok(())
}

impl Session {
    pub fn create_tablespace(&self, stmt: &CreateTablespaceStmt) -> Result<Oid> {
        let user = self.current_user();
        if !self.catalog.read(|data| data.is_superuser(user)) {
            return Err(insufficient_privilege(format!(
                "permission denied to create tablespace \"{}\"",
                stmt.name
            )));
        }

        let owner = match &stmt.owner {
            Some(name) => self.role_oid(name)?,
            None => user,
        };

        if stmt.is_dfs() && stmt.options.keys().any(|key| key.starts_with("content")) {
            return Err(invalid_parameter(
                "parameter \"content_id\" is not supported on dfs tablespace",
            ));
        }

        let location = canonicalize_location(&stmt.location);
        check_location(&location)?;

        if stmt.name.starts_with(RESERVED_PREFIX) {
            return Err(reserved_name(format!(
                "unacceptable tablespace name \"{}\"",
                stmt.name
            )));
        }

        let file_handler = match (&stmt.file_handler, stmt.is_dfs()) {
            (Some(handler), _) => Some(handler.clone()),
            (None, true) => Some(DEFAULT_FILE_HANDLER.to_string()),
            (None, false) => None,
        };
        if let Some(handler) = file_handler.as_deref() {
            let _ = FileHandlerSpec::parse(handler)?;
        }

        let oid = self.catalog.modify(|data| -> Result<Oid> {
            if data.tablespace_by_name(&stmt.name).is_some() {
                return Err(duplicate_object(format!(
                    "tablespace \"{}\" already exists",
                    stmt.name
                )));
            }
            if let Some(server) = stmt.options.get(SERVER_OPTION) {
                if data.server_by_name(server).is_none() {
                    return Err(undefined_object(format!("server \"{server}\" does not exist")));
                }
            }
            let oid = data.new_oid();
            let _ = data.tablespaces.insert(
                oid,
                TablespaceRow {
                    oid,
                    name: stmt.name.clone(),
                    owner,
                    acl: Vec::new(),
                    location: location.clone(),
                    options: stmt.options.clone(),
                    file_handler,
                },
            );
            Ok(oid)
        })?;

        if !stmt.is_dfs() {
            self.create_tablespace_directories(oid, Path::new(&location))?;
        }

        self.catalog.register_invalidation(InvalidationEvent::Tablespace);
        self.catalog.command_counter_increment();
        log_info!("Created tablespace {name} ({oid}) at {location}",
                  name: stmt.name.clone(), oid: oid.0, location: location);
        Ok(oid)
    }

    /// Make the host directory and point `pg_tblspc/<oid>` at it. A link
    /// left behind by an aborted create with the same oid is replaced.
    fn create_tablespace_directories(&self, oid: Oid, location: &Path) -> Result<()> {
        let local = LocalFileAm::new(self.config.data_dir.clone(), self.config.database_id);
        let version_dir = location.join(TABLESPACE_VERSION_DIRECTORY);
        std::fs::create_dir_all(&version_dir)
            .map_err(|e| fileam::Error::backend_op("create", &version_dir.display().to_string(), e))?;

        let link = local.tablespace_link(oid);
        if let Some(parent) = link.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::symlink_metadata(&link).is_ok() {
            std::fs::remove_file(&link)?;
        }
        make_link(location, &link)?;
        log_debug!("Linked {link} to {location}",
                   link: link.display().to_string(), location: location.display().to_string());
        Ok(())
    }

    /// Returns whether a tablespace was dropped
    pub fn drop_tablespace(&self, name: &str, missing_ok: bool) -> Result<bool> {
        let user = self.current_user();
        let Some(row) = self.catalog.read(|data| data.tablespace_by_name(name).cloned()) else {
            if missing_ok {
                log_info!("tablespace \"{name}\" does not exist, skipping", name: name.to_string());
                return Ok(false);
            }
            return Err(undefined_object(format!("tablespace \"{name}\" does not exist")));
        };

        self.check_tablespace_owner(&row)?;
        if row.oid == GLOBAL_TABLESPACE_OID || row.oid == DEFAULT_TABLESPACE_OID {
            return Err(insufficient_privilege(format!(
                "permission denied for tablespace {name}"
            )));
        }

        self.catalog.modify(|data| -> Result<()> {
            let in_use = data
                .directory_tables
                .values()
                .any(|table| table.tablespace == row.oid)
                || data.relations.values().any(|rel| rel.tablespace == row.oid);
            if in_use {
                return Err(invalid_object_definition(format!(
                    "tablespace \"{name}\" cannot be dropped because some objects depend on it"
                )));
            }
            let _ = data.tablespaces.remove(&row.oid);
            Ok(())
        })?;

        self.catalog.register_invalidation(InvalidationEvent::Tablespace);
        self.catalog.command_counter_increment();
        log_info!("Dropped tablespace {name} as {user}", name: name.to_string(), user: user.0);
        Ok(true)
    }

    /// Set or, with `reset`, remove tablespace options
    pub fn alter_tablespace_options(
        &self,
        name: &str,
        options: &BTreeMap<String, String>,
        reset: bool,
    ) -> Result<Oid> {
        if let Some(key) = options
            .keys()
            .find(|key| FIXED_OPTIONS.iter().any(|fixed| fixed.eq_ignore_ascii_case(key)))
        {
            return Err(invalid_parameter(format!(
                "could not change value for \"{key}\" option"
            )));
        }

        let row = self
            .catalog
            .read(|data| data.tablespace_by_name(name).cloned())
            .ok_or_else(|| undefined_object(format!("tablespace \"{name}\" does not exist")))?;
        self.check_tablespace_owner(&row)?;

        self.catalog.modify(|data| -> Result<()> {
            let row = data
                .tablespaces
                .get_mut(&row.oid)
                .ok_or_else(|| undefined_object(format!("tablespace \"{name}\" does not exist")))?;
            for (key, value) in options {
                if reset {
                    let _ = row.options.remove(key);
                } else {
                    let _ = row.options.insert(key.clone(), value.clone());
                }
            }
            Ok(())
        })?;

        self.catalog.register_invalidation(InvalidationEvent::Tablespace);
        self.catalog.command_counter_increment();
        Ok(row.oid)
    }

    /// `GRANT CREATE ON TABLESPACE name TO role`
    pub fn grant_tablespace_create(&self, name: &str, role: &str) -> Result<()> {
        let row = self
            .catalog
            .read(|data| data.tablespace_by_name(name).cloned())
            .ok_or_else(|| undefined_object(format!("tablespace \"{name}\" does not exist")))?;
        self.check_tablespace_owner(&row)?;
        let grantee = self.role_oid(role)?;

        self.catalog.modify(|data| -> Result<()> {
            if let Some(row) = data.tablespaces.get_mut(&row.oid) {
                if !row.acl.contains(&grantee) {
                    row.acl.push(grantee);
                }
            }
            Ok(())
        })?;
        self.catalog.register_invalidation(InvalidationEvent::Tablespace);
        self.catalog.command_counter_increment();
        Ok(())
    }

    pub fn tablespace_oid(&self, name: &str) -> Result<Oid> {
        self.catalog
            .read(|data| data.tablespace_by_name(name).map(|row| row.oid))
            .ok_or_else(|| undefined_object(format!("tablespace \"{name}\" does not exist")))
    }

    #[must_use]
    pub fn list_tablespaces(&self) -> Vec<TablespaceRow> {
        self.catalog
            .read(|data| data.tablespaces.values().cloned().collect())
    }

    fn check_tablespace_owner(&self, row: &TablespaceRow) -> Result<()> {
        let user = self.current_user();
        if row.owner == user || self.catalog.read(|data| data.is_superuser(user)) {
            Ok(())
        } else {
            Err(insufficient_privilege(format!(
                "must be owner of tablespace {}",
                row.name
            )))
        }
    }
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| DirTableError::store(link, e))
}

#[cfg(not(unix))]
fn make_link(_target: &Path, _link: &Path) -> Result<()> {
    Err(fileam::Error::unsupported("local", "tablespace links").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_location() {
        assert_eq!(canonicalize_location("/data/ts/"), "/data/ts");
        assert_eq!(canonicalize_location("///"), "/");
        assert_eq!(canonicalize_location("rel/"), "rel");
    }

    #[test]
    fn test_check_location() {
        assert_eq!(
            check_location("rel").unwrap_err().to_string(),
            "tablespace location must be an absolute path"
        );
        assert_eq!(
            check_location("/").unwrap_err().to_string(),
            "root directory can't be used as location"
        );
        let long = format!("/{}", "x".repeat(MAX_LOCATION_LEN));
        assert_eq!(
            check_location(&long).unwrap_err().kind(),
            Some(fileam::ErrorKind::InvalidObjectDefinition)
        );
        check_location("/bucket/dir").unwrap();
    }
}
