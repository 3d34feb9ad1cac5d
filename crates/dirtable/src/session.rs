// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Session state and transaction control
//!
//! A [`Session`] owns everything that lives for one connection: the catalog,
//! the access-method cache, the pending-delete log, the resource owner stack,
//! remote handles and connections, and the interrupt flag. Work happens
//! inside a [`Transaction`] guard; dropping the guard without committing
//! aborts.
//!
//! Transaction end runs in a fixed order: resource owners are released (so
//! remote handles are closed), then pending deletes are executed, then
//! catalog invalidations are delivered.

use crate::catalog::store::CatalogStore;
use crate::catalog::{Catalog, CatalogData};
use crate::config::SessionConfig;
use crate::error::{DirTableError, Result, undefined_object};
use crate::pending::PendingDeletes;
use diagnostics::{log_debug, log_info, log_warn};
use fileam::dfs::{ConnectionCache, ObjectStoreConnector, RemoteHandleSet};
use fileam::local::LocalFileAm;
use fileam::{
    FactoryContext, FileAm, FileAmResolver, InterruptHandle, InvalidationBus, Oid, ResourceOwnerId,
    ResourceOwners,
};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// One open nesting level: the transaction itself or a savepoint
#[derive(Debug)]
struct Level {
    owner: ResourceOwnerId,
    savepoint: Option<String>,
}

pub struct Session {
    pub(crate) config: SessionConfig,
    store: Box<dyn CatalogStore>,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) owners: ResourceOwners,
    pub(crate) interrupts: InterruptHandle,
    pub(crate) resolver: Arc<FileAmResolver>,
    pub(crate) connections: Arc<ConnectionCache>,
    pub(crate) remote_handles: Arc<RemoteHandleSet>,
    pub(crate) pending: PendingDeletes,
    levels: Vec<Level>,
}

impl Session {
    /// Attach to the catalog in `store`, bootstrapping it when empty, and run
    /// as the configured user
    pub fn open(
        config: SessionConfig,
        store: Box<dyn CatalogStore>,
        connector: Arc<dyn ObjectStoreConnector>,
    ) -> Result<Self> {
        let data = match store.load()? {
            Some(data) => data,
            None => {
                let data = CatalogData::bootstrap();
                store.save(&data)?;
                log_info!("Bootstrapped catalog {system_id}", system_id: data.system_id.clone());
                data
            }
        };

        let bus = InvalidationBus::new();
        let catalog = Arc::new(Catalog::new(data, bus.clone()));
        let user = catalog
            .read(|data| data.role_by_name(&config.user).map(|role| role.oid))
            .ok_or_else(|| undefined_object(format!("role \"{}\" does not exist", config.user)))?;
        catalog.set_current_user(user);

        let interrupts = InterruptHandle::new();
        let owners = ResourceOwners::new();
        let connections = Arc::new(ConnectionCache::new(connector, interrupts.clone()));
        connections.subscribe(&bus);
        let remote_handles = Arc::new(RemoteHandleSet::new());

        let context = FactoryContext {
            lookup: catalog.clone(),
            owners: owners.clone(),
            connections: connections.clone(),
            remote_handles: remote_handles.clone(),
            local: Arc::new(LocalFileAm::new(config.data_dir.clone(), config.database_id)),
            remote_block_size: config.remote_block_size,
        };
        let resolver = Arc::new(FileAmResolver::new(context));
        resolver.subscribe(&bus);

        log_debug!("Session open as {user} on {data_dir}",
                   user: config.user.clone(), data_dir: config.data_dir.display().to_string());

        Ok(Self {
            config,
            store,
            catalog,
            owners,
            interrupts,
            resolver,
            connections,
            remote_handles,
            pending: PendingDeletes::new(),
            levels: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<FileAmResolver> {
        &self.resolver
    }

    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionCache> {
        &self.connections
    }

    #[must_use]
    pub fn remote_handles(&self) -> &Arc<RemoteHandleSet> {
        &self.remote_handles
    }

    #[must_use]
    pub fn pending(&self) -> &PendingDeletes {
        &self.pending
    }

    /// Clonable cancel flag. Setting it makes the next interrupt check fail
    /// with `Canceled`.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupts.clone()
    }

    pub fn check_for_interrupts(&self) -> Result<()> {
        Ok(self.interrupts.check_for_interrupts()?)
    }

    /// 0 outside a transaction, 1 at top level, one more per savepoint
    #[must_use]
    pub fn nest_level(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.levels.is_empty()
    }

    /// Access method for a pending delete in `spc`, bound so that the
    /// delete runs without the catalog
    pub(crate) fn unlink_target(&self, spc: Oid) -> Result<Arc<dyn FileAm>> {
        let am = self.resolver.get(spc)?;
        Ok(am.bind_for_unlink(spc)?.unwrap_or(am))
    }

    pub(crate) fn require_transaction(&self) -> Result<()> {
        if self.in_transaction() {
            Ok(())
        } else {
            Err(DirTableError::NoTransaction)
        }
    }

    #[must_use]
    pub fn current_user(&self) -> Oid {
        self.catalog.current_user()
    }

    pub fn begin(&mut self) -> Result<Transaction<'_>> {
        if self.in_transaction() {
            return Err(DirTableError::TransactionInProgress);
        }
        self.push_level("TopTransaction", None);
        log_debug!("Transaction started");
        Ok(Transaction {
            session: self,
            finished: false,
        })
    }

    fn push_level(&mut self, owner_name: &str, savepoint: Option<String>) {
        let owner = self.owners.push(owner_name);
        self.catalog.begin_level();
        self.levels.push(Level { owner, savepoint });
    }

    fn savepoint_index(&self, name: &str) -> Result<usize> {
        self.levels
            .iter()
            .rposition(|level| level.savepoint.as_deref() == Some(name))
            .ok_or_else(|| DirTableError::NoSuchSavepoint(name.to_string()))
    }

    pub(crate) fn define_savepoint(&mut self, name: &str) -> Result<()> {
        self.require_transaction()?;
        self.push_level("SubTransaction", Some(name.to_string()));
        log_debug!("Savepoint {name} at level {level}", name: name.to_string(), level: self.nest_level());
        Ok(())
    }

    /// Commit every subtransaction down to and including savepoint `name`
    pub(crate) fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let index = self.savepoint_index(name)?;
        while self.levels.len() > index {
            self.commit_subtransaction();
        }
        Ok(())
    }

    /// Abort every subtransaction down to and including savepoint `name`,
    /// then start it again
    pub(crate) fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let index = self.savepoint_index(name)?;
        while self.levels.len() > index {
            self.abort_subtransaction();
        }
        self.push_level("SubTransaction", Some(name.to_string()));
        Ok(())
    }

    fn commit_subtransaction(&mut self) {
        let level = self.nest_level();
        let Some(top) = self.levels.pop() else {
            return;
        };
        self.owners.release(top.owner, true, false);
        self.pending.at_sub_commit(level);
        self.catalog.commit_level();
        log_debug!("Subtransaction {level} committed", level: level);
    }

    fn abort_subtransaction(&mut self) {
        let _hold = self.interrupts.hold();
        let level = self.nest_level();
        let Some(top) = self.levels.pop() else {
            return;
        };
        self.owners.release(top.owner, false, false);
        self.pending.at_sub_abort(level);
        self.catalog.abort_level();
        log_debug!("Subtransaction {level} aborted", level: level);
    }

    fn commit_transaction(&mut self) -> Result<()> {
        while self.levels.len() > 1 {
            self.commit_subtransaction();
        }

        let data = self.catalog.data();
        if let Err(err) = self.store.save(&data) {
            log_warn!("Could not save the catalog, aborting: {error}", error: err.to_string());
            self.abort_transaction();
            return Err(err);
        }

        if let Some(top) = self.levels.pop() {
            self.owners.release(top.owner, true, true);
        }
        let deleted = self.pending.do_deletes(true, 1);
        self.catalog.commit_level();
        self.catalog.end_transaction();
        log_info!("Transaction committed, {deleted} pending deletes executed", deleted: deleted);
        Ok(())
    }

    fn abort_transaction(&mut self) {
        let _hold = self.interrupts.hold();
        while self.levels.len() > 1 {
            self.abort_subtransaction();
        }
        if let Some(top) = self.levels.pop() {
            self.owners.release(top.owner, false, true);
        }
        let deleted = self.pending.do_deletes(false, 1);
        self.catalog.abort_level();
        self.catalog.end_transaction();
        log_info!("Transaction aborted, {deleted} pending deletes executed", deleted: deleted);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.config.user)
            .field("nest_level", &self.nest_level())
            .field("pending", &self.pending.len())
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Transaction guard
///
/// Derefs to the [`Session`] so catalog and storage commands run through
/// it. Must be finished with [`commit`](Self::commit) or
/// [`abort`](Self::abort); dropping it aborts.
pub struct Transaction<'a> {
    session: &'a mut Session,
    finished: bool,
}

impl Transaction<'_> {
    pub fn savepoint(&mut self, name: &str) -> Result<()> {
        self.session.define_savepoint(name)
    }

    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.session.release_savepoint(name)
    }

    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.session.rollback_to_savepoint(name)
    }

    /// Commit, closing any open savepoints first. A failure to save the
    /// catalog aborts the transaction and is returned.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.session.commit_transaction()
    }

    pub fn abort(mut self) {
        self.finished = true;
        self.session.abort_transaction();
    }
}

impl Deref for Transaction<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log_debug!("Transaction dropped without commit, aborting");
            self.session.abort_transaction();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::MemoryStore;
    use fileam::dfs::MemoryConnector;

    fn session_with(store: Arc<MemoryStore>) -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(
            SessionConfig::new(dir.path()),
            Box::new(store),
            Arc::new(MemoryConnector::new()),
        )
        .unwrap();
        (dir, session)
    }

    #[test]
    fn test_open_bootstraps_once() {
        let store = Arc::new(MemoryStore::new());
        let (_dir, first) = session_with(store.clone());
        let system_id = first.catalog().read(|data| data.system_id.clone());
        assert_eq!(store.saves(), 1);

        let (_dir, second) = session_with(store.clone());
        assert_eq!(second.catalog().read(|data| data.system_id.clone()), system_id);
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn test_unknown_user_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessionConfig::new(dir.path());
        config.user = "nobody".into();
        let err = Session::open(
            config,
            Box::new(MemoryStore::new()),
            Arc::new(MemoryConnector::new()),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "role \"nobody\" does not exist");
    }

    #[test]
    fn test_nesting_levels_and_owners() {
        let (_dir, mut session) = session_with(Arc::new(MemoryStore::new()));
        assert_eq!(session.nest_level(), 0);
        {
            let mut txn = session.begin().unwrap();
            assert_eq!(txn.nest_level(), 1);
            assert!(matches!(
                txn.begin(),
                Err(DirTableError::TransactionInProgress)
            ));
            txn.savepoint("a").unwrap();
            txn.savepoint("b").unwrap();
            assert_eq!(txn.nest_level(), 3);
            assert_eq!(txn.owners.depth(), 3);

            txn.rollback_to_savepoint("a").unwrap();
            assert_eq!(txn.nest_level(), 2);
            txn.release_savepoint("a").unwrap();
            assert_eq!(txn.nest_level(), 1);
            assert!(matches!(
                txn.release_savepoint("a"),
                Err(DirTableError::NoSuchSavepoint(_))
            ));
            txn.commit().unwrap();
        }
        assert_eq!(session.nest_level(), 0);
        assert_eq!(session.owners.depth(), 0);
    }

    #[test]
    fn test_drop_aborts_and_commit_saves() {
        let store = Arc::new(MemoryStore::new());
        let (_dir, mut session) = session_with(store.clone());
        let before = session.catalog().read(|data| data.next_oid);
        {
            let txn = session.begin().unwrap();
            let _ = txn
                .catalog
                .modify(|data| -> Result<Oid> { Ok(data.new_oid()) })
                .unwrap();
        }
        assert_eq!(session.catalog().read(|data| data.next_oid), before);
        assert_eq!(store.saves(), 1);

        let txn = session.begin().unwrap();
        let _ = txn
            .catalog
            .modify(|data| -> Result<Oid> { Ok(data.new_oid()) })
            .unwrap();
        txn.commit().unwrap();
        assert_eq!(store.saves(), 2);
        assert_eq!(
            store.load().unwrap().unwrap().next_oid,
            before + 1
        );
    }
}
