// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The system catalog
//!
//! All catalog rows live in one [`CatalogData`] value. The session takes a
//! copy of it when a transaction or savepoint starts and puts the copy back
//! when that level aborts, so every catalog command is undone with its
//! transaction. Changes that caches depend on register an invalidation; the
//! registered events are delivered locally at each command counter
//! increment and again when the transaction ends.

mod directory_table;
mod role;
mod storage_server;
pub mod store;
mod tablespace;

pub use directory_table::{CreateDirectoryTableStmt, DirectoryTable, trim_location};
pub use storage_server::validate_server_options;
pub use tablespace::{CreateTablespaceStmt, MAX_LOCATION_LEN};

use crate::lock;
use crate::row::DirectoryRow;
use diagnostics::log_debug;
use fileam::{
    BOOTSTRAP_SUPERUSER_OID, DEFAULT_TABLESPACE_OID, DfsServerInfo, FIRST_NORMAL_OID,
    FileHandlerSpec, GLOBAL_TABLESPACE_OID, InvalidationBus, InvalidationEvent, Oid,
    TablespaceInfo, TablespaceLookup,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub const BOOTSTRAP_SUPERUSER_NAME: &str = "postgres";
pub const DEFAULT_TABLESPACE_NAME: &str = "pg_default";
pub const GLOBAL_TABLESPACE_NAME: &str = "pg_global";

/// Name prefix reserved for system objects
pub const RESERVED_PREFIX: &str = "pg_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    #[default]
    Permanent,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRow {
    pub oid: Oid,
    pub name: String,
    pub superuser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablespaceRow {
    pub oid: Oid,
    pub name: String,
    pub owner: Oid,
    /// Roles holding CREATE besides the owner
    #[serde(default)]
    pub acl: Vec<Oid>,
    pub location: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub file_handler: Option<String>,
}

impl TablespaceRow {
    #[must_use]
    pub fn info(&self) -> TablespaceInfo {
        TablespaceInfo {
            oid: self.oid,
            name: self.name.clone(),
            owner: self.owner,
            location: self.location.clone(),
            options: self.options.clone(),
            file_handler: self.file_handler.clone(),
        }
    }

    #[must_use]
    pub fn is_dfs(&self) -> bool {
        self.options.contains_key(fileam::SERVER_OPTION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRow {
    pub oid: Oid,
    pub name: String,
    pub owner: Oid,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMappingRow {
    pub oid: Oid,
    pub server: Oid,
    /// `Oid::INVALID` maps PUBLIC
    pub user: Oid,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRow {
    pub oid: Oid,
    pub name: String,
    pub owner: Oid,
    pub persistence: Persistence,
    pub tablespace: Oid,
}

/// A `pg_directory_table` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTableRow {
    pub rel_id: Oid,
    pub tablespace: Oid,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogData {
    /// Identity of this catalog, fixed at bootstrap
    pub system_id: String,
    pub next_oid: u32,
    pub roles: BTreeMap<Oid, RoleRow>,
    pub tablespaces: BTreeMap<Oid, TablespaceRow>,
    #[serde(default)]
    pub servers: BTreeMap<Oid, ServerRow>,
    #[serde(default)]
    pub user_mappings: BTreeMap<Oid, UserMappingRow>,
    #[serde(default)]
    pub relations: BTreeMap<Oid, RelationRow>,
    #[serde(default)]
    pub directory_tables: BTreeMap<Oid, DirectoryTableRow>,
    /// Metadata rows of each directory table, keyed by relative path
    #[serde(default)]
    pub files: BTreeMap<Oid, BTreeMap<String, DirectoryRow>>,
}

impl CatalogData {
    /// A fresh catalog: the bootstrap superuser and the two system tablespaces
    #[must_use]
    pub fn bootstrap() -> Self {
        let system_tablespace = |oid: Oid, name: &str| TablespaceRow {
            oid,
            name: name.to_string(),
            owner: BOOTSTRAP_SUPERUSER_OID,
            acl: Vec::new(),
            location: String::new(),
            options: BTreeMap::new(),
            file_handler: None,
        };
        Self {
            system_id: uuid7::uuid7().to_string(),
            next_oid: FIRST_NORMAL_OID,
            roles: BTreeMap::from([(
                BOOTSTRAP_SUPERUSER_OID,
                RoleRow {
                    oid: BOOTSTRAP_SUPERUSER_OID,
                    name: BOOTSTRAP_SUPERUSER_NAME.to_string(),
                    superuser: true,
                },
            )]),
            tablespaces: BTreeMap::from([
                (
                    DEFAULT_TABLESPACE_OID,
                    system_tablespace(DEFAULT_TABLESPACE_OID, DEFAULT_TABLESPACE_NAME),
                ),
                (
                    GLOBAL_TABLESPACE_OID,
                    system_tablespace(GLOBAL_TABLESPACE_OID, GLOBAL_TABLESPACE_NAME),
                ),
            ]),
            servers: BTreeMap::new(),
            user_mappings: BTreeMap::new(),
            relations: BTreeMap::new(),
            directory_tables: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }

    /// Reject rows no session could use: malformed file handlers
    pub fn validate(&self) -> fileam::Result<()> {
        for tablespace in self.tablespaces.values() {
            if let Some(handler) = tablespace.file_handler.as_deref() {
                let _ = FileHandlerSpec::parse(handler)?;
            }
        }
        Ok(())
    }

    pub(crate) fn new_oid(&mut self) -> Oid {
        let oid = Oid(self.next_oid);
        self.next_oid += 1;
        oid
    }

    #[must_use]
    pub fn role_by_name(&self, name: &str) -> Option<&RoleRow> {
        self.roles.values().find(|role| role.name == name)
    }

    /// Role name for messages; unknown oids print as numbers
    #[must_use]
    pub fn role_name(&self, oid: Oid) -> String {
        if !oid.is_valid() {
            return "public".to_string();
        }
        self.roles
            .get(&oid)
            .map_or_else(|| oid.to_string(), |role| role.name.clone())
    }

    #[must_use]
    pub fn is_superuser(&self, oid: Oid) -> bool {
        self.roles.get(&oid).is_some_and(|role| role.superuser)
    }

    #[must_use]
    pub fn tablespace_by_name(&self, name: &str) -> Option<&TablespaceRow> {
        self.tablespaces.values().find(|spc| spc.name == name)
    }

    #[must_use]
    pub fn server_by_name(&self, name: &str) -> Option<&ServerRow> {
        self.servers.values().find(|server| server.name == name)
    }

    #[must_use]
    pub fn relation_by_name(&self, name: &str) -> Option<&RelationRow> {
        self.relations.values().find(|rel| rel.name == name)
    }

    /// The mapping `user` gets for `server`: its own, else PUBLIC's
    #[must_use]
    pub fn user_mapping_for(&self, server: Oid, user: Oid) -> Option<&UserMappingRow> {
        let find = |user: Oid| {
            self.user_mappings
                .values()
                .find(|mapping| mapping.server == server && mapping.user == user)
        };
        find(user).or_else(|| find(Oid::INVALID))
    }
}

struct CatalogState {
    data: CatalogData,
    /// Catalog as it was when each open nesting level started
    snapshots: Vec<CatalogData>,
    command_id: u32,
    current_user: Oid,
    /// Registered since the last command counter increment
    unsent: Vec<InvalidationEvent>,
    /// Registered anywhere in the current transaction
    transaction_events: Vec<InvalidationEvent>,
}

pub struct Catalog {
    state: Mutex<CatalogState>,
    bus: InvalidationBus,
}

impl Catalog {
    pub fn new(data: CatalogData, bus: InvalidationBus) -> Self {
        Self {
            state: Mutex::new(CatalogState {
                data,
                snapshots: Vec::new(),
                command_id: 0,
                current_user: BOOTSTRAP_SUPERUSER_OID,
                unsent: Vec::new(),
                transaction_events: Vec::new(),
            }),
            bus,
        }
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        lock(&self.state)
    }

    #[must_use]
    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn read<T>(&self, f: impl FnOnce(&CatalogData) -> T) -> T {
        f(&self.state().data)
    }

    /// Apply a change. `f` checks before it mutates: an `Err` must leave the
    /// data untouched.
    pub(crate) fn modify<T, E>(&self, f: impl FnOnce(&mut CatalogData) -> Result<T, E>) -> Result<T, E> {
        f(&mut self.state().data)
    }

    /// A copy of the current rows, for persisting
    #[must_use]
    pub fn data(&self) -> CatalogData {
        self.state().data.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Oid {
        self.state().current_user
    }

    pub(crate) fn set_current_user(&self, user: Oid) {
        self.state().current_user = user;
    }

    #[must_use]
    pub fn command_id(&self) -> u32 {
        self.state().command_id
    }

    pub(crate) fn register_invalidation(&self, event: InvalidationEvent) {
        let mut state = self.state();
        state.unsent.push(event);
        state.transaction_events.push(event);
    }

    /// Make the changes so far visible to later commands: bump the command
    /// id and deliver pending invalidations locally
    pub fn command_counter_increment(&self) {
        let events = {
            let mut state = self.state();
            state.command_id += 1;
            std::mem::take(&mut state.unsent)
        };
        self.publish(events);
    }

    pub(crate) fn begin_level(&self) {
        let mut state = self.state();
        let snapshot = state.data.clone();
        state.snapshots.push(snapshot);
    }

    /// Keep the level's changes; they now belong to the parent level
    pub(crate) fn commit_level(&self) {
        let _ = self.state().snapshots.pop();
    }

    /// Put the catalog back as it was when the level started and flush the
    /// caches that may have seen the discarded rows
    pub(crate) fn abort_level(&self) {
        let events = {
            let mut state = self.state();
            if let Some(snapshot) = state.snapshots.pop() {
                state.data = snapshot;
            }
            state.unsent.clear();
            state.transaction_events.clone()
        };
        self.publish(events);
    }

    /// Deliver every invalidation of the finished transaction
    pub(crate) fn end_transaction(&self) {
        let events = {
            let mut state = self.state();
            state.unsent.clear();
            state.command_id = 0;
            std::mem::take(&mut state.transaction_events)
        };
        self.publish(events);
    }

    fn publish(&self, mut events: Vec<InvalidationEvent>) {
        let mut seen = Vec::with_capacity(events.len());
        events.retain(|event| {
            if seen.contains(event) {
                false
            } else {
                seen.push(*event);
                true
            }
        });
        for event in &events {
            log_debug!("Delivering invalidation {event}", event: format!("{event:?}"));
            self.bus.publish(event);
        }
    }
}

impl TablespaceLookup for Catalog {
    fn tablespace(&self, spc: Oid) -> fileam::Result<Option<TablespaceInfo>> {
        Ok(self.read(|data| data.tablespaces.get(&spc).map(TablespaceRow::info)))
    }

    fn dfs_server(&self, server: &str) -> fileam::Result<DfsServerInfo> {
        let state = self.state();
        let data = &state.data;
        let row = data.server_by_name(server).ok_or_else(|| {
            fileam::Error::undefined_object(format!("server \"{server}\" does not exist"))
        })?;
        let mapping = data
            .user_mapping_for(row.oid, state.current_user)
            .ok_or_else(|| {
                fileam::Error::undefined_object(format!(
                    "user mapping not found for \"{}\"",
                    data.role_name(state.current_user)
                ))
            })?;
        Ok(DfsServerInfo {
            name: row.name.clone(),
            server_options: row.options.clone(),
            user_options: mapping.options.clone(),
            user_mapping: mapping.oid,
        })
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Catalog")
            .field("system_id", &state.data.system_id)
            .field("levels", &state.snapshots.len())
            .field("command_id", &state.command_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_bus() -> (InvalidationBus, Arc<Mutex<Vec<InvalidationEvent>>>) {
        let bus = InvalidationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Arc::new(move |event: &InvalidationEvent| {
            sink.lock().unwrap().push(*event);
        }));
        (bus, seen)
    }

    #[test]
    fn test_bootstrap_rows() {
        let data = CatalogData::bootstrap();
        assert!(data.is_superuser(BOOTSTRAP_SUPERUSER_OID));
        assert_eq!(
            data.tablespace_by_name(DEFAULT_TABLESPACE_NAME).unwrap().oid,
            DEFAULT_TABLESPACE_OID
        );
        assert_eq!(data.next_oid, FIRST_NORMAL_OID);
        assert!(!data.system_id.is_empty());
        data.validate().unwrap();
    }

    #[test]
    fn test_abort_level_restores_rows_and_flushes() {
        let (bus, seen) = recording_bus();
        let catalog = Catalog::new(CatalogData::bootstrap(), bus);

        catalog.begin_level();
        let oid = catalog.modify(|data| -> fileam::Result<Oid> { Ok(data.new_oid()) }).unwrap();
        catalog.register_invalidation(InvalidationEvent::Tablespace);
        catalog.command_counter_increment();
        catalog.command_counter_increment();
        assert_eq!(catalog.command_id(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);

        catalog.abort_level();
        assert_eq!(catalog.read(|data| data.next_oid), oid.0);
        assert_eq!(seen.lock().unwrap().len(), 2);

        catalog.end_transaction();
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(catalog.command_id(), 0);
    }

    #[test]
    fn test_events_are_deduplicated() {
        let (bus, seen) = recording_bus();
        let catalog = Catalog::new(CatalogData::bootstrap(), bus);
        catalog.register_invalidation(InvalidationEvent::Tablespace);
        catalog.register_invalidation(InvalidationEvent::Tablespace);
        catalog.register_invalidation(InvalidationEvent::UserMapping(Some(Oid(7))));
        catalog.end_transaction();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                InvalidationEvent::Tablespace,
                InvalidationEvent::UserMapping(Some(Oid(7)))
            ]
        );
    }

    #[test]
    fn test_dfs_server_needs_a_mapping() {
        let catalog = Catalog::new(CatalogData::bootstrap(), InvalidationBus::new());
        let err = catalog.dfs_server("s1").unwrap_err();
        assert_eq!(err.to_string(), "server \"s1\" does not exist");

        catalog
            .modify(|data| -> fileam::Result<()> {
                let oid = data.new_oid();
                let _ = data.servers.insert(
                    oid,
                    ServerRow {
                        oid,
                        name: "s1".into(),
                        owner: BOOTSTRAP_SUPERUSER_OID,
                        options: BTreeMap::from([("protocol".into(), "memory".into())]),
                    },
                );
                Ok(())
            })
            .unwrap();
        let err = catalog.dfs_server("s1").unwrap_err();
        assert_eq!(err.to_string(), "user mapping not found for \"postgres\"");

        catalog
            .modify(|data| -> fileam::Result<()> {
                let server = data.server_by_name("s1").unwrap().oid;
                let oid = data.new_oid();
                let _ = data.user_mappings.insert(
                    oid,
                    UserMappingRow {
                        oid,
                        server,
                        user: Oid::INVALID,
                        options: BTreeMap::from([("accesskey".into(), "k".into())]),
                    },
                );
                Ok(())
            })
            .unwrap();
        let info = catalog.dfs_server("s1").unwrap();
        assert_eq!(info.user_options.get("accesskey").map(String::as_str), Some("k"));
    }

    #[test]
    fn test_json_round_trip_keeps_oid_keys() {
        let data = CatalogData::bootstrap();
        let text = serde_json::to_string_pretty(&data).unwrap();
        let back: CatalogData = serde_json::from_str(&text).unwrap();
        assert_eq!(back, data);
    }
}
