// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Tablespace to access-method resolution
//!
//! The resolver caches one access method per tablespace for the session.
//! Any tablespace invalidation purges the whole cache; the next lookup reads
//! the catalog again and, for a tablespace with a file handler, calls the
//! registered factory.

use crate::am::{BackendKind, FileAm};
use crate::error::{Error, Result};
use crate::factory::{FactoryContext, FactoryRegistry, FileHandlerSpec};
use crate::invalidation::{InvalidationBus, InvalidationEvent};
use crate::lock;
use crate::types::Oid;
use diagnostics::log_debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Counters for monitoring the resolver cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub invalidations: u64,
}

pub struct FileAmResolver {
    cache: Mutex<HashMap<Oid, Arc<dyn FileAm>>>,
    context: FactoryContext,
    stats: Mutex<ResolverStats>,
}

impl FileAmResolver {
    pub fn new(context: FactoryContext) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            context,
            stats: Mutex::new(ResolverStats::default()),
        }
    }

    /// Purge the cache on every tablespace invalidation
    pub fn subscribe(self: &Arc<Self>, bus: &InvalidationBus) {
        let weak: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(Arc::new(move |event: &InvalidationEvent| {
            if let (Some(resolver), InvalidationEvent::Tablespace) = (weak.upgrade(), event) {
                resolver.invalidate_all();
            }
        }));
    }

    #[must_use]
    pub fn context(&self) -> &FactoryContext {
        &self.context
    }

    /// The session's local access method
    #[must_use]
    pub fn local(&self) -> Arc<dyn FileAm> {
        self.context.local.clone()
    }

    /// Access method of tablespace `spc`
    pub fn get(&self, spc: Oid) -> Result<Arc<dyn FileAm>> {
        if let Some(am) = lock(&self.cache).get(&spc) {
            lock(&self.stats).hits += 1;
            return Ok(am.clone());
        }
        lock(&self.stats).misses += 1;

        let tablespace = self.context.lookup.tablespace_required(spc)?;
        let am = match tablespace.file_handler.as_deref().map(str::trim) {
            None | Some("") => self.local(),
            Some(handler) => {
                let spec = FileHandlerSpec::parse(handler)?;
                let factory = FactoryRegistry::require(&spec)?;
                let am = (factory.create)(&self.context).ok_or_else(Self::rejected)?;
                if am.kind() == BackendKind::Local
                    || std::ptr::addr_eq(Arc::as_ptr(&am), Arc::as_ptr(&self.context.local))
                {
                    return Err(Self::rejected());
                }
                log_debug!("Tablespace {name} uses file handler {handler}",
                           name: tablespace.name.clone(), handler: spec.to_string());
                am
            }
        };

        let mut cache = lock(&self.cache);
        if cache.contains_key(&spc) {
            return Err(Error::duplicate_object(format!(
                "extra tablespace oid \"{spc}\" already exists"
            )));
        }
        let _ = cache.insert(spc, am.clone());
        lock(&self.stats).inserts += 1;
        Ok(am)
    }

    fn rejected() -> Error {
        Error::file_backend("tablespace file handler did not return a file access method")
    }

    pub fn invalidate_all(&self) {
        let mut cache = lock(&self.cache);
        if !cache.is_empty() {
            cache.clear();
            lock(&self.stats).invalidations += 1;
            log_debug!("File access method cache invalidated");
        }
    }

    #[must_use]
    pub fn is_cached(&self, spc: Oid) -> bool {
        lock(&self.cache).contains_key(&spc)
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        *lock(&self.stats)
    }
}

impl std::fmt::Debug for FileAmResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAmResolver")
            .field("cached", &lock(&self.cache).len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfs::{ConnectionCache, MemoryConnector, RemoteHandleSet};
    use crate::factory::DEFAULT_FILE_HANDLER;
    use crate::interrupt::InterruptHandle;
    use crate::local::LocalFileAm;
    use crate::lookup::{DfsServerInfo, SERVER_OPTION, TablespaceInfo, TablespaceLookup};
    use crate::resowner::ResourceOwners;
    use crate::{DEFAULT_TABLESPACE_OID, ErrorKind};
    use std::collections::BTreeMap;

    fn no_access_method(_context: &FactoryContext) -> Option<Arc<dyn FileAm>> {
        None
    }

    fn hands_back_local(context: &FactoryContext) -> Option<Arc<dyn FileAm>> {
        Some(context.local.clone())
    }

    static COUNTED_CALLS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

    fn counted(context: &FactoryContext) -> Option<Arc<dyn FileAm>> {
        let _ = COUNTED_CALLS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Some(Arc::new(crate::dfs::DfsFileAm::new(
            context.lookup.clone(),
            context.owners.clone(),
            context.connections.clone(),
            context.remote_handles.clone(),
            context.remote_block_size,
        )))
    }

    crate::register_file_am_factory! {
        library: "resolver_test",
        symbol: counted,
        description: "Counts its calls",
        create: counted
    }

    crate::register_file_am_factory! {
        library: "resolver_test",
        symbol: no_access_method,
        description: "Returns nothing",
        create: no_access_method
    }

    crate::register_file_am_factory! {
        library: "resolver_test",
        symbol: hands_back_local,
        description: "Returns the local access method",
        create: hands_back_local
    }

    #[derive(Default)]
    struct MutableLookup {
        rows: Mutex<HashMap<Oid, TablespaceInfo>>,
    }

    impl MutableLookup {
        fn set(&self, oid: u32, handler: Option<&str>) {
            let mut options = BTreeMap::new();
            if handler == Some(DEFAULT_FILE_HANDLER) {
                let _ = options.insert(SERVER_OPTION.to_string(), "s1".to_string());
            }
            let _ = self.rows.lock().unwrap().insert(
                Oid(oid),
                TablespaceInfo {
                    oid: Oid(oid),
                    name: format!("ts{oid}"),
                    owner: Oid(10),
                    location: "/bucket".to_string(),
                    options,
                    file_handler: handler.map(str::to_string),
                },
            );
        }
    }

    impl TablespaceLookup for MutableLookup {
        fn tablespace(&self, spc: Oid) -> Result<Option<TablespaceInfo>> {
            Ok(self.rows.lock().unwrap().get(&spc).cloned())
        }

        fn dfs_server(&self, server: &str) -> Result<DfsServerInfo> {
            Err(Error::undefined_object(format!("server \"{server}\" does not exist")))
        }
    }

    fn resolver() -> (Arc<MutableLookup>, Arc<FileAmResolver>, InvalidationBus) {
        let lookup = Arc::new(MutableLookup::default());
        lookup.set(DEFAULT_TABLESPACE_OID.0, None);
        let interrupts = InterruptHandle::new();
        let context = FactoryContext {
            lookup: lookup.clone(),
            owners: ResourceOwners::new(),
            connections: Arc::new(ConnectionCache::new(
                Arc::new(MemoryConnector::new()),
                interrupts,
            )),
            remote_handles: Arc::new(RemoteHandleSet::new()),
            local: Arc::new(LocalFileAm::new("/nonexistent".into(), Oid(1))),
            remote_block_size: 1024,
        };
        let resolver = Arc::new(FileAmResolver::new(context));
        let bus = InvalidationBus::new();
        resolver.subscribe(&bus);
        (lookup, resolver, bus)
    }

    #[test]
    fn test_local_and_remote_resolution() {
        let (lookup, resolver, _bus) = resolver();
        lookup.set(17000, Some(DEFAULT_FILE_HANDLER));

        let local = resolver.get(DEFAULT_TABLESPACE_OID).unwrap();
        assert_eq!(local.kind(), BackendKind::Local);
        let remote = resolver.get(Oid(17000)).unwrap();
        assert_eq!(remote.kind(), BackendKind::Dfs);

        let again = resolver.get(Oid(17000)).unwrap();
        assert!(Arc::ptr_eq(&remote, &again));
        let stats = resolver.stats();
        assert_eq!((stats.hits, stats.misses, stats.inserts), (1, 2, 2));
    }

    #[test]
    fn test_invalidation_purges_everything() {
        let (lookup, resolver, bus) = resolver();
        lookup.set(17000, Some("resolver_test,counted"));
        let _ = resolver.get(DEFAULT_TABLESPACE_OID).unwrap();
        let before = resolver.get(Oid(17000)).unwrap();
        let _ = resolver.get(Oid(17000)).unwrap();
        let calls = || COUNTED_CALLS.load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(calls(), 1);

        // User-mapping events leave the resolver alone.
        bus.publish(&InvalidationEvent::UserMapping(None));
        assert!(resolver.is_cached(Oid(17000)));

        bus.publish(&InvalidationEvent::Tablespace);
        assert!(!resolver.is_cached(Oid(17000)));
        assert!(!resolver.is_cached(DEFAULT_TABLESPACE_OID));

        let after = resolver.get(Oid(17000)).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(calls(), 2);
        assert_eq!(resolver.stats().invalidations, 1);
    }

    #[test]
    fn test_factory_rejection_leaves_cache_unchanged() {
        let (lookup, resolver, _bus) = resolver();
        lookup.set(17001, Some("resolver_test,no_access_method"));
        lookup.set(17002, Some("resolver_test,hands_back_local"));

        for oid in [17001, 17002] {
            let err = resolver.get(Oid(oid)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FileBackend);
            assert!(!resolver.is_cached(Oid(oid)));
        }
        assert_eq!(resolver.stats().inserts, 0);
    }

    #[test]
    fn test_catalog_problems() {
        let (lookup, resolver, _bus) = resolver();
        let err = resolver.get(Oid(424242)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CatalogLookup);
        assert_eq!(err.to_string(), "cache lookup failed for tablespace 424242");

        lookup.set(17003, Some("no-comma"));
        assert_eq!(
            resolver.get(Oid(17003)).unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );

        lookup.set(17004, Some("nolib,nosym"));
        assert_eq!(
            resolver.get(Oid(17004)).unwrap_err().kind(),
            ErrorKind::UndefinedObject
        );
    }
}
