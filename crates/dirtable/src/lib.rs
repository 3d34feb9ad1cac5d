// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Directory tables
//!
//! A directory table is a relation whose rows describe files kept in the
//! file area of a tablespace. This crate holds the catalog side (the
//! `pg_directory_table` entry plus the tablespace, storage server, user
//! mapping and role rows it depends on), the per-session pending-delete log
//! that makes file creation and removal follow transaction outcome, and the
//! coordinators that tie them to the [`fileam`] access methods.
//!
//! Everything runs through a [`Session`]:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use dirtable::{CreateDirectoryTableStmt, MemoryStore, Session, SessionConfig};
//! # fn main() -> dirtable::Result<()> {
//! let mut session = Session::open(
//!     SessionConfig::new("/srv/dirtable"),
//!     Box::new(MemoryStore::new()),
//!     Arc::new(fileam::dfs::BuilderConnector),
//! )?;
//! let mut txn = session.begin()?;
//! let rel = txn.create_directory_table(&CreateDirectoryTableStmt::new("docs", "incoming"))?;
//! let _row = txn.copy_from(rel, "a.txt", &mut &b"hello"[..], None)?;
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod catalog;
pub mod config;
mod copy;
mod error;
pub mod pending;
pub mod row;
mod session;
mod storage;

pub use catalog::store::{CatalogStore, JsonFileStore, MemoryStore};
pub use catalog::{
    Catalog, CatalogData, CreateDirectoryTableStmt, CreateTablespaceStmt, DirectoryTable,
    Persistence,
};
pub use config::SessionConfig;
pub use error::{DirTableError, Result};
pub use pending::{PendingAction, PendingDeletes};
pub use row::DirectoryRow;
pub use session::{Session, Transaction};

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
