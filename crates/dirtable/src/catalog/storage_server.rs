// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Storage servers and user mappings
//!
//! A storage server holds the connection options of an object store. A
//! user mapping adds per-role options (usually credentials); a mapping with
//! no role applies to everyone without one of their own. Every mapping
//! change is announced so pooled connections built from it are rebuilt.

use super::{ServerRow, UserMappingRow};
use crate::error::{
    Result, duplicate_object, insufficient_privilege, invalid_object_definition,
    invalid_parameter, undefined_object,
};
use crate::session::Session;
use diagnostics::{log_debug, log_info};
use fileam::dfs::options::{HTTPS, PROTOCOL, VIRTUAL_HOST, parse_bool};
use fileam::dfs::Protocol;
use fileam::{InvalidationEvent, Oid, SERVER_OPTION};
use std::collections::BTreeMap;

/// Check the options a server or mapping is created with. Keys compare
/// without regard to case.
pub fn validate_server_options(options: &BTreeMap<String, String>) -> Result<()> {
    let mut seen: Vec<String> = Vec::with_capacity(options.len());
    for (key, value) in options {
        let lower = key.to_ascii_lowercase();
        if seen.contains(&lower) {
            return Err(invalid_parameter(format!(
                "option \"{key}\" provided more than once"
            )));
        }
        seen.push(lower.clone());

        if lower == PROTOCOL {
            let _ = Protocol::parse(value)?;
        } else if (lower == HTTPS || lower == VIRTUAL_HOST) && parse_bool(value).is_none() {
            return Err(invalid_parameter(format!(
                "invalid value for boolean option \"{key}\": {value}"
            )));
        }
    }
    Ok(())
}

impl Session {
    /// Returns `None` when `if_not_exists` skipped an existing server
    pub fn create_storage_server(
        &self,
        name: &str,
        options: &BTreeMap<String, String>,
        if_not_exists: bool,
    ) -> Result<Option<Oid>> {
        let user = self.current_user();
        if !self.catalog.read(|data| data.is_superuser(user)) {
            return Err(insufficient_privilege(format!(
                "permission denied to create storage server \"{name}\""
            )));
        }
        if self.catalog.read(|data| data.server_by_name(name).is_some()) {
            if if_not_exists {
                log_info!("storage server \"{name}\" already exists, skipping", name: name.to_string());
                return Ok(None);
            }
            return Err(duplicate_object(format!(
                "storage server \"{name}\" already exists"
            )));
        }

        validate_server_options(options)?;
        if !options.keys().any(|key| key.eq_ignore_ascii_case(PROTOCOL)) {
            return Err(invalid_parameter(format!("option \"{PROTOCOL}\" not found")));
        }

        let oid = self.catalog.modify(|data| -> Result<Oid> {
            let oid = data.new_oid();
            let _ = data.servers.insert(
                oid,
                ServerRow {
                    oid,
                    name: name.to_string(),
                    owner: user,
                    options: options.clone(),
                },
            );
            Ok(oid)
        })?;
        self.catalog.command_counter_increment();
        log_info!("Created storage server {name}", name: name.to_string());
        Ok(Some(oid))
    }

    /// Drop a server and its user mappings. Returns whether one was dropped.
    pub fn drop_storage_server(&self, name: &str, missing_ok: bool) -> Result<bool> {
        let Some(server) = self.catalog.read(|data| data.server_by_name(name).cloned()) else {
            if missing_ok {
                log_info!("server \"{name}\" does not exist, skipping", name: name.to_string());
                return Ok(false);
            }
            return Err(undefined_object(format!("server \"{name}\" does not exist")));
        };
        self.check_server_owner(&server)?;

        let removed = self.catalog.modify(|data| -> Result<usize> {
            let in_use = data
                .tablespaces
                .values()
                .any(|spc| spc.options.get(SERVER_OPTION).is_some_and(|s| s == name));
            if in_use {
                return Err(invalid_object_definition(format!(
                    "storage server \"{name}\" cannot be dropped because some objects depend on it"
                )));
            }
            let _ = data.servers.remove(&server.oid);
            let before = data.user_mappings.len();
            data.user_mappings.retain(|_, mapping| mapping.server != server.oid);
            Ok(before - data.user_mappings.len())
        })?;

        self.catalog
            .register_invalidation(InvalidationEvent::UserMapping(None));
        self.catalog.command_counter_increment();
        log_info!("Dropped storage server {name} and {removed} user mappings",
                  name: name.to_string(), removed: removed);
        Ok(true)
    }

    /// Map `user` (PUBLIC when `None`) to `server`
    pub fn create_user_mapping(
        &self,
        server: &str,
        user: Option<&str>,
        options: &BTreeMap<String, String>,
    ) -> Result<Oid> {
        let (server, user_oid) = self.mapping_target(server, user)?;
        validate_server_options(options)?;

        let oid = self.catalog.modify(|data| -> Result<Oid> {
            if data
                .user_mappings
                .values()
                .any(|m| m.server == server.oid && m.user == user_oid)
            {
                return Err(duplicate_object(format!(
                    "user mapping for \"{}\" already exists for server \"{}\"",
                    data.role_name(user_oid),
                    server.name
                )));
            }
            let oid = data.new_oid();
            let _ = data.user_mappings.insert(
                oid,
                UserMappingRow {
                    oid,
                    server: server.oid,
                    user: user_oid,
                    options: options.clone(),
                },
            );
            Ok(oid)
        })?;

        self.catalog
            .register_invalidation(InvalidationEvent::UserMapping(Some(oid)));
        self.catalog.command_counter_increment();
        log_debug!("Created user mapping {oid} on {server}", oid: oid.0, server: server.name);
        Ok(oid)
    }

    /// Set options on an existing mapping; an empty value removes the key
    pub fn alter_user_mapping(
        &self,
        server: &str,
        user: Option<&str>,
        options: &BTreeMap<String, String>,
    ) -> Result<Oid> {
        let (server, user_oid) = self.mapping_target(server, user)?;
        validate_server_options(options)?;

        let oid = self.catalog.modify(|data| -> Result<Oid> {
            let role_name = data.role_name(user_oid);
            let mapping = data
                .user_mappings
                .values_mut()
                .find(|m| m.server == server.oid && m.user == user_oid)
                .ok_or_else(|| {
                    undefined_object(format!(
                        "user mapping for \"{role_name}\" does not exist for server \"{}\"",
                        server.name
                    ))
                })?;
            for (key, value) in options {
                if value.is_empty() {
                    let _ = mapping.options.remove(key);
                } else {
                    let _ = mapping.options.insert(key.clone(), value.clone());
                }
            }
            Ok(mapping.oid)
        })?;

        self.catalog
            .register_invalidation(InvalidationEvent::UserMapping(Some(oid)));
        self.catalog.command_counter_increment();
        Ok(oid)
    }

    pub fn drop_user_mapping(&self, server: &str, user: Option<&str>, missing_ok: bool) -> Result<bool> {
        let (server, user_oid) = self.mapping_target(server, user)?;

        let dropped = self.catalog.modify(|data| -> Result<Option<Oid>> {
            let found = data
                .user_mappings
                .values()
                .find(|m| m.server == server.oid && m.user == user_oid)
                .map(|m| m.oid);
            match found {
                Some(oid) => {
                    let _ = data.user_mappings.remove(&oid);
                    Ok(Some(oid))
                }
                None if missing_ok => Ok(None),
                None => Err(undefined_object(format!(
                    "user mapping for \"{}\" does not exist for server \"{}\"",
                    data.role_name(user_oid),
                    server.name
                ))),
            }
        })?;

        let Some(oid) = dropped else {
            log_info!("user mapping does not exist for server \"{server}\", skipping",
                      server: server.name);
            return Ok(false);
        };
        self.catalog
            .register_invalidation(InvalidationEvent::UserMapping(Some(oid)));
        self.catalog.command_counter_increment();
        Ok(true)
    }

    /// Resolve the server and role of a mapping command and check that the
    /// current user may manage it: the server's owner, a superuser, or a
    /// role managing its own mapping
    fn mapping_target(&self, server: &str, user: Option<&str>) -> Result<(ServerRow, Oid)> {
        let server = self
            .catalog
            .read(|data| data.server_by_name(server).cloned())
            .ok_or_else(|| undefined_object(format!("server \"{server}\" does not exist")))?;
        let user_oid = match user {
            Some(name) => self.role_oid(name)?,
            None => Oid::INVALID,
        };
        if user_oid != self.current_user() {
            self.check_server_owner(&server)?;
        }
        Ok((server, user_oid))
    }

    fn check_server_owner(&self, server: &ServerRow) -> Result<()> {
        let user = self.current_user();
        if server.owner == user || self.catalog.read(|data| data.is_superuser(user)) {
            Ok(())
        } else {
            Err(insufficient_privilege(format!(
                "must be owner of storage server {}",
                server.name
            )))
        }
    }

    /// Storage servers ordered by name
    #[must_use]
    pub fn list_storage_servers(&self) -> Vec<ServerRow> {
        let mut servers: Vec<ServerRow> = self
            .catalog
            .read(|data| data.servers.values().cloned().collect());
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_validate_server_options() {
        validate_server_options(&options(&[("protocol", "s3a"), ("https", "on")])).unwrap();

        let err = validate_server_options(&options(&[("Protocol", "s3a"), ("protocol", "cos")]))
            .unwrap_err();
        assert!(err.to_string().contains("provided more than once"));

        let err = validate_server_options(&options(&[("virtual_host", "maybe")])).unwrap_err();
        assert_eq!(err.kind(), Some(fileam::ErrorKind::InvalidParameter));

        let err = validate_server_options(&options(&[("protocol", "ftp")])).unwrap_err();
        assert!(err.to_string().starts_with("invalid value \"ftp\" for option \"protocol\""));

        let err = validate_server_options(&options(&[("protocol", "hdfs")])).unwrap_err();
        assert_eq!(err.kind(), Some(fileam::ErrorKind::Unsupported));
    }
}
