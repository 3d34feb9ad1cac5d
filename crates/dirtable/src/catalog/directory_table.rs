// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! `pg_directory_table` entries

use super::{DirectoryTableRow, GLOBAL_TABLESPACE_NAME, Persistence};
use crate::error::{Result, catalog_lookup, insufficient_privilege, invalid_parameter, undefined_object};
use crate::session::Session;
use diagnostics::log_debug;
use fileam::{GLOBAL_TABLESPACE_OID, Oid};

/// In-memory view of a `pg_directory_table` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTable {
    pub rel_id: Oid,
    pub tablespace_id: Oid,
    /// Relative to the tablespace's file area, without leading or trailing `/`
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDirectoryTableStmt {
    pub relation_name: String,
    pub tablespace: Option<String>,
    pub location: String,
    pub persistence: Persistence,
}

impl CreateDirectoryTableStmt {
    pub fn new(relation_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            relation_name: relation_name.into(),
            tablespace: None,
            location: location.into(),
            persistence: Persistence::Permanent,
        }
    }

    #[must_use]
    pub fn in_tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    #[must_use]
    pub fn temporary(mut self) -> Self {
        self.persistence = Persistence::Temporary;
        self
    }
}

/// Strip `/` from both ends of a location
#[must_use]
pub fn trim_location(location: &str) -> &str {
    location.trim_matches('/')
}

impl Session {
    /// The directory table of relation `rel_id`. Also resolves the access
    /// method of its tablespace so later file operations hit the cache.
    pub fn get_directory_table(&self, rel_id: Oid) -> Result<DirectoryTable> {
        let row = self
            .catalog
            .read(|data| data.directory_tables.get(&rel_id).cloned())
            .ok_or_else(|| catalog_lookup(format!("cache lookup failed for directory table {rel_id}")))?;

        let location = row.location.ok_or_else(|| {
            catalog_lookup(format!("directory table {rel_id} has a null location"))
        })?;

        let tablespace_id = self.effective_tablespace(row.tablespace);
        let _ = self.resolver.get(tablespace_id)?;

        Ok(DirectoryTable {
            rel_id,
            tablespace_id,
            location,
        })
    }

    #[must_use]
    pub fn directory_table_exists(&self, rel_id: Oid) -> bool {
        self.catalog
            .read(|data| data.directory_tables.contains_key(&rel_id))
    }

    pub fn remove_directory_table_entry(&self, rel_id: Oid) -> Result<()> {
        self.catalog.modify(|data| -> Result<()> {
            let _ = data.directory_tables.remove(&rel_id).ok_or_else(|| {
                catalog_lookup(format!("could not find tuple for directory table {rel_id}"))
            })?;
            let _ = data.files.remove(&rel_id);
            Ok(())
        })?;
        self.catalog.command_counter_increment();
        log_debug!("Removed directory table entry {rel}", rel: rel_id.0);
        Ok(())
    }

    /// Insert the `pg_directory_table` row of a new relation
    pub fn create_directory_table_entry(
        &self,
        stmt: &CreateDirectoryTableStmt,
        rel_id: Oid,
    ) -> Result<()> {
        let location = trim_location(&stmt.location);
        if location.is_empty() {
            return Err(invalid_parameter(
                "invalid \"location\": only relative path can be used",
            ));
        }

        let tablespace = self.choose_tablespace(stmt)?;
        if tablespace != self.config.database_tablespace {
            self.check_tablespace_create(tablespace)?;
        }
        if tablespace == GLOBAL_TABLESPACE_OID {
            return Err(invalid_parameter(format!(
                "only shared relations can be placed in {GLOBAL_TABLESPACE_NAME} tablespace"
            )));
        }

        self.catalog.command_counter_increment();

        let row = DirectoryTableRow {
            rel_id,
            tablespace,
            location: Some(location.to_string()),
        };
        self.catalog.modify(|data| -> Result<()> {
            if data.directory_tables.contains_key(&rel_id) {
                return Err(crate::error::duplicate_object(format!(
                    "directory table {rel_id} already exists"
                )));
            }
            let _ = data.directory_tables.insert(rel_id, row);
            Ok(())
        })?;
        log_debug!("Directory table {rel} at {location} in tablespace {spc}",
                   rel: rel_id.0, location: location.to_string(), spc: tablespace.0);
        Ok(())
    }

    /// Tablespace for a new relation: the named one, else the configured
    /// default for its persistence, else the database's own
    fn choose_tablespace(&self, stmt: &CreateDirectoryTableStmt) -> Result<Oid> {
        let configured = match stmt.persistence {
            Persistence::Permanent => self.config.default_tablespace.as_deref(),
            Persistence::Temporary => self.config.temp_tablespace.as_deref(),
        };
        let name = stmt
            .tablespace
            .as_deref()
            .or(configured.filter(|name| !name.is_empty()));
        match name {
            Some(name) => self.tablespace_oid(name),
            None => Ok(self.config.database_tablespace),
        }
    }

    /// Fail unless the current user may create objects in `spc`
    pub(crate) fn check_tablespace_create(&self, spc: Oid) -> Result<()> {
        let user = self.current_user();
        self.catalog.read(|data| -> Result<()> {
            let row = data.tablespaces.get(&spc).ok_or_else(|| {
                undefined_object(format!("tablespace with OID {spc} does not exist"))
            })?;
            if data.is_superuser(user) || row.owner == user || row.acl.contains(&user) {
                Ok(())
            } else {
                Err(insufficient_privilege(format!(
                    "permission denied for tablespace {}",
                    row.name
                )))
            }
        })
    }

    /// Rows never store the invalid oid, but an invalid one means the
    /// database's tablespace
    pub(crate) fn effective_tablespace(&self, spc: Oid) -> Oid {
        if spc.is_valid() {
            spc
        } else {
            self.config.database_tablespace
        }
    }
}
