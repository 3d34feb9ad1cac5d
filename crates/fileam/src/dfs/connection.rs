// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Pooled object-store connections
//!
//! Connections are keyed by `"<server>.<tablespace path>"` and live for the
//! session. A user-mapping invalidation marks matching entries; the next
//! `get` for a marked entry builds a fresh connection from the current
//! options.

use super::options::{DfsOptions, Protocol, split_path};
use crate::error::{Error, Result};
use crate::interrupt::InterruptHandle;
use crate::invalidation::{InvalidationBus, InvalidationEvent};
use crate::lock;
use crate::lookup::TablespaceLookup;
use crate::local::relative_name;
use crate::types::Oid;
use crate::wait_event::{WaitEvent, report_wait_start};
use diagnostics::{log_debug, log_info};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Runtime;

/// Builds an object store for a bucket.
///
/// Returns the store and the path inside it that corresponds to the bucket
/// root.
pub trait ObjectStoreConnector: Send + Sync {
    fn connect(&self, options: &DfsOptions, bucket: &str) -> Result<(Arc<dyn ObjectStore>, Path)>;
}

/// Connector for real deployments: S3-compatible services and host directories
#[derive(Debug, Default)]
pub struct BuilderConnector;

impl ObjectStoreConnector for BuilderConnector {
    fn connect(&self, options: &DfsOptions, bucket: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
        match &options.protocol {
            Protocol::ObjectStore(_) => {
                let endpoint = options.endpoint_url()?;
                let mut builder = object_store::aws::AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(&options.region)
                    .with_endpoint(&endpoint)
                    .with_allow_http(endpoint.starts_with("http://"))
                    .with_virtual_hosted_style_request(options.virtual_host);

                if let Some(access_key) = &options.access_key {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(secret_key) = &options.secret_key {
                    builder = builder.with_secret_access_key(secret_key);
                }

                let store = builder
                    .build()
                    .map_err(|e| Error::file_backend(format!("failed to build S3 store: {e}")))?;
                Ok((Arc::new(store), Path::default()))
            }
            Protocol::Local => {
                let root = options
                    .root
                    .as_deref()
                    .ok_or_else(|| Error::invalid_parameter("option \"root\" not found"))?;
                let dir = std::path::Path::new(root).join(bucket);
                std::fs::create_dir_all(&dir)?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(&dir)
                    .map_err(|e| Error::file_backend(format!("failed to build local store: {e}")))?;
                Ok((Arc::new(store), Path::default()))
            }
            Protocol::Memory => Err(Error::file_backend(
                "the memory protocol needs an in-process connector",
            )),
        }
    }
}

/// Connector over one shared in-memory store. Buckets become top-level
/// directories of the store.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    store: Arc<InMemory>,
    connects: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn store(&self) -> Arc<InMemory> {
        self.store.clone()
    }

    /// Number of successful connects so far
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make subsequent connects fail, as an unreachable service would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl ObjectStoreConnector for MemoryConnector {
    fn connect(&self, _options: &DfsOptions, bucket: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::file_backend("service unavailable"));
        }
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok((self.store.clone(), Path::from(bucket)))
    }
}

/// A live connection: a store, the tablespace's prefix inside it, and the
/// runtime that drives its futures
pub struct DfsConnection {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    runtime: Arc<Runtime>,
    interrupts: InterruptHandle,
}

impl DfsConnection {
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Object path of a file-area name
    pub fn object_path(&self, name: &str) -> Result<Path> {
        let relative = relative_name(name)?;
        let mut path = self.prefix.clone();
        for part in relative.iter() {
            let part = part.to_string_lossy();
            if part != "." {
                path = path.child(part.as_ref());
            }
        }
        Ok(path)
    }

    /// Run a store future to completion. A pending cancel request is
    /// serviced before the call goes out.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        self.interrupts.check_for_interrupts()?;
        Ok(self.runtime.block_on(future))
    }
}

impl std::fmt::Debug for DfsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DfsConnection")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .finish()
    }
}

struct CacheEntry {
    connection: Option<Arc<DfsConnection>>,
    invalidated: bool,
    user_mapping: Oid,
}

/// Session-wide cache of DFS connections
pub struct ConnectionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    connector: Arc<dyn ObjectStoreConnector>,
    runtime: Mutex<Option<Arc<Runtime>>>,
    interrupts: InterruptHandle,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn ObjectStoreConnector>, interrupts: InterruptHandle) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            connector,
            runtime: Mutex::new(None),
            interrupts,
        }
    }

    /// Mark entries on user-mapping invalidations
    pub fn subscribe(self: &Arc<Self>, bus: &InvalidationBus) {
        let weak: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(Arc::new(move |event: &InvalidationEvent| {
            if let (Some(cache), InvalidationEvent::UserMapping(mapping)) = (weak.upgrade(), event) {
                cache.invalidate_user_mapping(*mapping);
            }
        }));
    }

    fn cache_key(server: &str, path: &str) -> String {
        format!("{server}.{path}")
    }

    fn runtime(&self) -> Result<Arc<Runtime>> {
        let mut runtime = lock(&self.runtime);
        if let Some(rt) = runtime.as_ref() {
            return Ok(rt.clone());
        }
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::file_backend(format!("failed to start I/O runtime: {e}")))?;
        let rt = Arc::new(rt);
        *runtime = Some(rt.clone());
        Ok(rt)
    }

    /// Connection for a tablespace at `path` on `server`
    pub fn get(
        &self,
        lookup: &dyn TablespaceLookup,
        server: &str,
        path: &str,
    ) -> Result<Arc<DfsConnection>> {
        let key = Self::cache_key(server, path);
        {
            let entries = lock(&self.entries);
            if let Some(entry) = entries.get(&key) {
                if let (Some(connection), false) = (&entry.connection, entry.invalidated) {
                    return Ok(connection.clone());
                }
            }
        }

        if let Some(entry) = lock(&self.entries).get_mut(&key) {
            if entry.connection.take().is_some() {
                log_debug!("Closing invalidated connection {key}", key: key.clone());
            }
        }

        let info = lookup.dfs_server(server)?;
        let options = DfsOptions::parse(&info.server_options, &info.user_options)?;
        let (bucket, workdir) = split_path(path)?;

        let (store, root) = {
            let _wait = report_wait_start(WaitEvent::DfsConnect);
            self.connector
                .connect(&options, &bucket)
                .map_err(|e| Error::file_backend(format!("failed to connect to \"{server}\": {e}")))?
        };

        let mut prefix = root;
        for part in workdir.split('/').filter(|p| !p.is_empty()) {
            prefix = prefix.child(part);
        }

        let connection = Arc::new(DfsConnection {
            store,
            prefix,
            runtime: self.runtime()?,
            interrupts: self.interrupts.clone(),
        });

        log_info!("Connected to storage server {server} ({protocol}) for {path}",
                  server: server.to_string(), protocol: options.protocol.name().to_string(), path: path.to_string());

        let _ = lock(&self.entries).insert(
            key,
            CacheEntry {
                connection: Some(connection.clone()),
                invalidated: false,
                user_mapping: info.user_mapping,
            },
        );
        Ok(connection)
    }

    /// Mark connections built from `mapping`, or every connection for `None`
    pub fn invalidate_user_mapping(&self, mapping: Option<Oid>) {
        let mut entries = lock(&self.entries);
        for entry in entries.values_mut() {
            if entry.connection.is_none() {
                continue;
            }
            if mapping.is_none_or(|m| m == entry.user_mapping) {
                entry.invalidated = true;
            }
        }
    }

    #[must_use]
    pub fn is_cached(&self, server: &str, path: &str) -> bool {
        lock(&self.entries)
            .get(&Self::cache_key(server, path))
            .is_some_and(|entry| entry.connection.is_some() && !entry.invalidated)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("entries", &self.len())
            .finish()
    }
}
