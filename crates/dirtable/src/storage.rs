// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Directory table lifecycle
//!
//! Creating a directory table only writes catalog rows; its location
//! directory appears with the first ingested file. Dropping one schedules
//! the removal of the whole location for commit, so an aborted drop leaves
//! every file in place.

use crate::catalog::{CreateDirectoryTableStmt, DirectoryTableRow, RelationRow};
use crate::error::{
    Result, catalog_lookup, duplicate_object, insufficient_privilege, undefined_object,
};
use crate::session::Session;
use diagnostics::{log_debug, log_info};
use fileam::{GLOBAL_TABLESPACE_OID, Oid};
use std::collections::BTreeMap;

impl Session {
    /// Create the relation and its `pg_directory_table` row
    pub fn create_directory_table(&mut self, stmt: &CreateDirectoryTableStmt) -> Result<Oid> {
        self.require_transaction()?;
        if self
            .catalog
            .read(|data| data.relation_by_name(&stmt.relation_name).is_some())
        {
            return Err(duplicate_object(format!(
                "relation \"{}\" already exists",
                stmt.relation_name
            )));
        }

        let rel_id = self
            .catalog
            .modify(|data| -> Result<Oid> { Ok(data.new_oid()) })?;
        self.create_directory_table_entry(stmt, rel_id)?;

        let owner = self.current_user();
        self.catalog.modify(|data| -> Result<()> {
            let tablespace = data
                .directory_tables
                .get(&rel_id)
                .map(|row| row.tablespace)
                .ok_or_else(|| catalog_lookup(format!("cache lookup failed for directory table {rel_id}")))?;
            let _ = data.relations.insert(
                rel_id,
                RelationRow {
                    oid: rel_id,
                    name: stmt.relation_name.clone(),
                    owner,
                    persistence: stmt.persistence,
                    tablespace,
                },
            );
            let _ = data.files.insert(rel_id, BTreeMap::new());
            Ok(())
        })?;
        self.catalog.command_counter_increment();

        log_info!("Created directory table {name} ({rel})",
                  name: stmt.relation_name.clone(), rel: rel_id.0);
        Ok(rel_id)
    }

    /// Schedule removal of the table's whole location at commit
    pub fn directory_table_drop_storage(&mut self, rel_id: Oid) -> Result<()> {
        self.require_transaction()?;
        let table = self.get_directory_table(rel_id)?;

        let tablespace = self
            .catalog
            .read(|data| data.tablespaces.get(&table.tablespace_id).cloned())
            .ok_or_else(|| {
                undefined_object(format!("tablespace \"{}\" does not exist", table.tablespace_id))
            })?;

        if tablespace.oid != self.config.database_tablespace {
            let user = self.current_user();
            if tablespace.owner != user && !self.catalog.read(|data| data.is_superuser(user)) {
                return Err(insufficient_privilege(format!(
                    "must be owner of tablespace {}",
                    tablespace.name
                )));
            }
        }
        if tablespace.oid == GLOBAL_TABLESPACE_OID {
            return Err(insufficient_privilege(format!(
                "permission denied for tablespace {}",
                tablespace.name
            )));
        }

        // Binding connects a DFS tablespace now, while its rows still exist.
        let am = self.unlink_target(table.tablespace_id)?;
        let path = format!("/{}", table.location);
        let level = self.nest_level();
        self.pending
            .add_delete_pending(am, table.tablespace_id, &path, level);
        log_debug!("Scheduled removal of {path} in {tablespace}",
                   path: path, tablespace: tablespace.name);
        Ok(())
    }

    /// Remove `path` from the table's file area if the transaction aborts
    pub fn file_add_create_pending_entry(&mut self, rel_id: Oid, spc: Oid, path: &str) -> Result<()> {
        self.require_directory_table(rel_id)?;
        let level = self.nest_level();
        let spc = self.effective_tablespace(spc);
        let am = self.unlink_target(spc)?;
        self.pending.add_create_pending(am, spc, path, level);
        Ok(())
    }

    /// Remove `path` from the table's file area if the transaction commits
    pub fn file_add_delete_pending_entry(&mut self, rel_id: Oid, spc: Oid, path: &str) -> Result<()> {
        self.require_directory_table(rel_id)?;
        let level = self.nest_level();
        let spc = self.effective_tablespace(spc);
        let am = self.unlink_target(spc)?;
        self.pending.add_delete_pending(am, spc, path, level);
        Ok(())
    }

    fn require_directory_table(&self, rel_id: Oid) -> Result<()> {
        self.require_transaction()?;
        if self.directory_table_exists(rel_id) {
            Ok(())
        } else {
            Err(catalog_lookup(format!(
                "cache lookup failed for directory table {rel_id}"
            )))
        }
    }

    /// Drop a directory table: its files go at commit, its rows right away.
    /// Returns whether a table was dropped.
    pub fn drop_directory_table(&mut self, name: &str, missing_ok: bool) -> Result<bool> {
        self.require_transaction()?;
        let Some(relation) = self.catalog.read(|data| data.relation_by_name(name).cloned()) else {
            if missing_ok {
                log_info!("directory table \"{name}\" does not exist, skipping", name: name.to_string());
                return Ok(false);
            }
            return Err(undefined_object(format!("directory table \"{name}\" does not exist")));
        };

        let user = self.current_user();
        if relation.owner != user && !self.catalog.read(|data| data.is_superuser(user)) {
            return Err(insufficient_privilege(format!(
                "must be owner of directory table {name}"
            )));
        }

        self.directory_table_drop_storage(relation.oid)?;
        self.remove_directory_table_entry(relation.oid)?;
        self.catalog.modify(|data| -> Result<()> {
            let _ = data.relations.remove(&relation.oid);
            Ok(())
        })?;
        self.catalog.command_counter_increment();
        log_info!("Dropped directory table {name}", name: name.to_string());
        Ok(true)
    }

    pub fn relation_oid(&self, name: &str) -> Result<Oid> {
        self.catalog
            .read(|data| data.relation_by_name(name).map(|rel| rel.oid))
            .ok_or_else(|| undefined_object(format!("relation \"{name}\" does not exist")))
    }

    /// Every directory table with its relation, ordered by name
    #[must_use]
    pub fn list_directory_tables(&self) -> Vec<(RelationRow, DirectoryTableRow)> {
        let mut tables: Vec<(RelationRow, DirectoryTableRow)> = self.catalog.read(|data| {
            data.directory_tables
                .values()
                .filter_map(|table| {
                    data.relations
                        .get(&table.rel_id)
                        .map(|rel| (rel.clone(), table.clone()))
                })
                .collect()
        });
        tables.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        tables
    }
}
