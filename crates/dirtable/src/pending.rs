// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Pending file deletes
//!
//! Every file mutation records what to remove if the transaction ends one
//! way or the other: a freshly written file is removed on abort, a dropped
//! table or removed file is removed on commit. Entries carry the nesting
//! level that made them and are executed newest first.
//!
//! The access method is bound when an entry is made. Draining the log never
//! reads the catalog, so a tablespace dropped later in the same transaction
//! does not strand the files scheduled for removal.
//!
//! Deletes are never redone from a log after a crash; orphaned files are
//! reconciled out of band.

use diagnostics::{log_debug, log_warn};
use fileam::{FileAm, Oid};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PendingAction {
    pub tablespace: Oid,
    pub relative_path: String,
    /// Delete at commit when true, at abort when false
    pub at_commit: bool,
    pub nest_level: usize,
    /// Access method bound when the entry was made; the drain uses it as is
    pub am: Arc<dyn FileAm>,
}

/// The session's pending-delete log. The newest entry is at the end.
#[derive(Debug, Default)]
pub struct PendingDeletes {
    entries: Vec<PendingAction>,
}

impl PendingDeletes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove `path` if the transaction aborts
    pub fn add_create_pending(&mut self, am: Arc<dyn FileAm>, spc: Oid, path: &str, nest_level: usize) {
        self.push(am, spc, path, false, nest_level);
    }

    /// Remove `path` if the transaction commits
    pub fn add_delete_pending(&mut self, am: Arc<dyn FileAm>, spc: Oid, path: &str, nest_level: usize) {
        self.push(am, spc, path, true, nest_level);
    }

    fn push(&mut self, am: Arc<dyn FileAm>, spc: Oid, path: &str, at_commit: bool, nest_level: usize) {
        log_debug!("Pending delete of {path} in tablespace {spc} at {when}, level {level}",
                   path: path.to_string(),
                   spc: spc.0,
                   when: if at_commit { "commit" } else { "abort" },
                   level: nest_level);
        self.entries.push(PendingAction {
            tablespace: spc,
            relative_path: path.to_string(),
            at_commit,
            nest_level,
            am,
        });
    }

    /// Entries newest first
    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.entries.iter().rev()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Execute and forget every entry made at `nest_level` or deeper.
    ///
    /// Entries are detached before any file is touched, so a failing unlink
    /// is never retried. Failures are logged and otherwise ignored. Returns
    /// the number of unlinks attempted.
    pub fn do_deletes(&mut self, is_commit: bool, nest_level: usize) -> usize {
        let (detached, kept): (Vec<PendingAction>, Vec<PendingAction>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|action| action.nest_level >= nest_level);
        self.entries = kept;

        let mut attempted = 0;
        for action in detached.into_iter().rev() {
            if action.at_commit != is_commit {
                continue;
            }
            attempted += 1;
            if let Err(err) = action.am.unlink(action.tablespace, &action.relative_path) {
                log_warn!("could not remove file \"{path}\": {error}",
                          path: action.relative_path, error: err.to_string());
            }
        }
        attempted
    }

    /// Hand the committing level's entries to its parent
    pub fn at_sub_commit(&mut self, nest_level: usize) {
        for action in &mut self.entries {
            if action.nest_level >= nest_level {
                action.nest_level = nest_level - 1;
            }
        }
    }

    /// Execute the aborting level's abort-time deletes now
    pub fn at_sub_abort(&mut self, nest_level: usize) -> usize {
        self.do_deletes(false, nest_level)
    }
}
