// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! DFS file access method -- tablespace file areas in an object store
//!
//! A DFS tablespace names a storage server in its options and a location of
//! the form `/bucket/workdir`. Files live under that prefix. Connections come
//! from the session's [`ConnectionCache`]; every open handle is entered in
//! the [`RemoteHandleSet`] under the current resource owner so that a handle
//! leaked by an error path is closed when its scope ends.
//!
//! Object stores are written front to back, so write handles reject `seek`
//! and `pwrite` appends.

mod connection;
mod file;
pub mod options;


pub use connection::{
    BuilderConnector, ConnectionCache, DfsConnection, MemoryConnector, ObjectStoreConnector,
};
pub use file::{DfsFile, RemoteHandleSet};
pub use options::{DfsOptions, Protocol};

use crate::am::{BackendKind, FileAm, UFile};
use crate::error::{Error, Result};
use crate::lookup::TablespaceLookup;
use crate::resowner::ResourceOwners;
use crate::types::{OpenFlags, Oid, RelFileNode};
use diagnostics::{log_debug, log_warn};
use file::{RemoteHandle, RemoteIo};
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use std::sync::Arc;

/// Upload part size for remote writes
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024 * 1024;

pub struct DfsFileAm {
    lookup: Arc<dyn TablespaceLookup>,
    owners: ResourceOwners,
    connections: Arc<ConnectionCache>,
    handles: Arc<RemoteHandleSet>,
    block_size: usize,
    /// Connection fixed for one tablespace by `bind_for_unlink`
    bound: Option<(Oid, Arc<DfsConnection>)>,
}

impl DfsFileAm {
    pub fn new(
        lookup: Arc<dyn TablespaceLookup>,
        owners: ResourceOwners,
        connections: Arc<ConnectionCache>,
        handles: Arc<RemoteHandleSet>,
        block_size: usize,
    ) -> Self {
        Self {
            lookup,
            owners,
            connections,
            handles,
            block_size,
            bound: None,
        }
    }

    /// The pooled connection serving `spc`
    pub fn connection(&self, spc: Oid) -> Result<Arc<DfsConnection>> {
        if let Some((bound_spc, connection)) = &self.bound {
            if *bound_spc == spc {
                return Ok(connection.clone());
            }
        }
        let tablespace = self.lookup.tablespace_required(spc)?;
        let server = tablespace.server().ok_or_else(|| {
            Error::invalid_parameter(format!(
                "tablespace \"{}\" is not a DFS tablespace",
                tablespace.name
            ))
        })?;
        self.connections
            .get(self.lookup.as_ref(), server, &tablespace.location)
    }
}

impl FileAm for DfsFileAm {
    fn kind(&self) -> BackendKind {
        BackendKind::Dfs
    }

    fn open(&self, spc: Oid, name: &str, flags: OpenFlags) -> Result<UFile> {
        let connection = self.connection(spc)?;
        self.handles.register_release_callback(&self.owners);

        let owner = self
            .owners
            .current()
            .ok_or_else(|| Error::file_backend("cannot open a remote file outside a transaction"))?;
        let path = connection.object_path(name)?;
        let store = connection.store().clone();

        let io = if flags.is_write() {
            if flags.has(OpenFlags::EXCL) {
                match connection.block_on(store.head(&path))? {
                    Ok(_) => return Err(Error::backend_op("open", name, "file already exists")),
                    Err(object_store::Error::NotFound { .. }) => {}
                    Err(err) => return Err(Error::backend_op("open", name, err)),
                }
            }
            RemoteIo::Writer {
                writer: BufWriter::with_capacity(store, path.clone(), self.block_size),
                written: 0,
            }
        } else {
            let meta = connection
                .block_on(store.head(&path))?
                .map_err(|e| Error::backend_op("open", name, e))?;
            RemoteIo::Reader {
                size: meta.size,
                position: 0,
            }
        };

        let handle = self
            .handles
            .insert(RemoteHandle::new(owner, name, path, connection, io));
        log_debug!("Opened remote file {name} for {owner}", name: name.to_string(), owner: owner.to_string());
        Ok(UFile::new(Box::new(DfsFile::new(handle, self.handles.clone()))))
    }

    fn unlink(&self, spc: Oid, name: &str) -> Result<()> {
        let connection = self.connection(spc)?;
        let path = connection.object_path(name)?;
        let store = connection.store().clone();

        let listed = connection.block_on(store.list(Some(&path)).try_collect::<Vec<_>>())?;
        let mut locations: Vec<_> = match listed {
            Ok(objects) => objects.into_iter().map(|meta| meta.location).collect(),
            Err(err) => {
                log_warn!("could not list files under \"{name}\": {error}",
                          name: name.to_string(), error: err.to_string());
                Vec::new()
            }
        };
        locations.push(path);

        for location in locations {
            match connection.block_on(store.delete(&location))? {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(err) => {
                    log_warn!("could not remove file \"{path}\": {error}",
                              path: location.to_string(), error: err.to_string());
                }
            }
        }
        Ok(())
    }

    fn exists(&self, spc: Oid, name: &str) -> Result<bool> {
        let connection = self.connection(spc)?;
        let path = connection.object_path(name)?;
        let store = connection.store().clone();

        match connection.block_on(store.head(&path))? {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => {
                let mut listing = store.list(Some(&path));
                let first = connection.block_on(listing.try_next())?;
                Ok(first
                    .map_err(|e| Error::backend_op("stat", name, e))?
                    .is_some())
            }
            Err(err) => Err(Error::backend_op("stat", name, err)),
        }
    }

    fn bind_for_unlink(&self, spc: Oid) -> Result<Option<Arc<dyn FileAm>>> {
        let connection = self.connection(spc)?;
        log_debug!("Bound {path} for later removal", path: connection.prefix().to_string());
        Ok(Some(Arc::new(Self {
            lookup: self.lookup.clone(),
            owners: self.owners.clone(),
            connections: self.connections.clone(),
            handles: self.handles.clone(),
            block_size: self.block_size,
            bound: Some((spc, connection)),
        })))
    }

    fn format_file_name(&self, node: &RelFileNode, name: &str) -> String {
        format!(
            "{}/{}_dirtable/{}",
            node.db_node,
            node.rel_node,
            name.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for DfsFileAm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DfsFileAm")
            .field("connections", &self.connections)
            .field("handles", &self.handles)
            .field("block_size", &self.block_size)
            .field("bound", &self.bound.as_ref().map(|(spc, _)| *spc))
            .finish()
    }
}
