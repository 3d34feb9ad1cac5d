// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::connection::DfsConnection;
use crate::am::{BackendKind, FileOps};
use crate::error::{Error, Result};
use crate::lock;
use crate::resowner::{ReleaseContext, ReleasePhase, ResourceOwnerId, ResourceOwners};
use crate::wait_event::{WaitEvent, report_wait_start};
use diagnostics::{log_debug, log_info, log_warn};
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::io::AsyncWriteExt;

/// Remote side of an open handle
pub(crate) enum RemoteIo {
    Reader { size: u64, position: u64 },
    Writer { writer: BufWriter, written: u64 },
}

/// One entry of the open-set
pub(crate) struct RemoteHandle {
    id: u64,
    owner: ResourceOwnerId,
    name: String,
    path: Path,
    connection: Arc<DfsConnection>,
    io: Mutex<Option<RemoteIo>>,
}

impl RemoteHandle {
    pub(crate) fn new(
        owner: ResourceOwnerId,
        name: &str,
        path: Path,
        connection: Arc<DfsConnection>,
        io: RemoteIo,
    ) -> Self {
        Self {
            id: 0,
            owner,
            name: name.to_string(),
            path,
            connection,
            io: Mutex::new(Some(io)),
        }
    }

    /// Release the remote side. A writer completes its upload when `finish`
    /// is set and is aborted otherwise. Later calls do nothing.
    fn shut(&self, finish: bool) -> Result<()> {
        let io = lock(&self.io).take();
        match io {
            Some(RemoteIo::Writer {
                mut writer,
                written,
            }) => {
                if finish {
                    let _wait = report_wait_start(WaitEvent::DataFileWrite);
                    self.connection
                        .block_on(writer.shutdown())?
                        .map_err(|e| Error::backend_op("close", &self.name, e))?;
                    log_debug!("Uploaded {name} ({written} bytes)", name: self.name.clone(), written: written);
                } else {
                    self.connection
                        .block_on(writer.abort())?
                        .map_err(|e| Error::backend_op("abort", &self.name, e))?;
                    log_debug!("Aborted upload of {name}", name: self.name.clone());
                }
                Ok(())
            }
            Some(RemoteIo::Reader { .. }) | None => Ok(()),
        }
    }
}

/// Every DFS handle open in the session, tagged with its resource owner
#[derive(Default)]
pub struct RemoteHandleSet {
    handles: Mutex<BTreeMap<u64, Arc<RemoteHandle>>>,
    next_id: AtomicU64,
    registered: AtomicBool,
    leaks: AtomicU64,
}

impl RemoteHandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook the set into resource-owner release. Only the first call
    /// registers; later calls are no-ops.
    pub fn register_release_callback(self: &Arc<Self>, owners: &ResourceOwners) {
        if self
            .registered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        owners.register_release_callback(Arc::new(move |ctx: &ReleaseContext| {
            if let Some(set) = weak.upgrade() {
                set.on_release(ctx);
            }
        }));
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub(crate) fn insert(&self, mut handle: RemoteHandle) -> Arc<RemoteHandle> {
        handle.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = Arc::new(handle);
        let _ = lock(&self.handles).insert(handle.id, handle.clone());
        handle
    }

    fn remove(&self, id: u64) -> Option<Arc<RemoteHandle>> {
        lock(&self.handles).remove(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.handles).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles still held by `owner`
    #[must_use]
    pub fn owned_by(&self, owner: ResourceOwnerId) -> usize {
        lock(&self.handles)
            .values()
            .filter(|handle| handle.owner == owner)
            .count()
    }

    /// Handles found still open when their owner committed
    #[must_use]
    pub fn leak_count(&self) -> u64 {
        self.leaks.load(Ordering::SeqCst)
    }

    fn on_release(&self, ctx: &ReleaseContext) {
        if ctx.phase != ReleasePhase::AfterLocks {
            return;
        }

        let released: Vec<Arc<RemoteHandle>> = {
            let mut handles = lock(&self.handles);
            let ids: Vec<u64> = handles
                .values()
                .filter(|handle| handle.owner == ctx.owner)
                .map(|handle| handle.id)
                .collect();
            ids.iter().filter_map(|id| handles.remove(id)).collect()
        };

        for handle in released {
            if ctx.is_commit {
                let _ = self.leaks.fetch_add(1, Ordering::SeqCst);
                log_info!("remote file reference leak: {id} still referenced",
                          id: handle.id, name: handle.name.clone());
            }
            if let Err(err) = handle.shut(ctx.is_commit) {
                log_warn!("could not close remote file {name}: {error}",
                          name: handle.name.clone(), error: err.to_string());
            }
        }
    }
}

impl std::fmt::Debug for RemoteHandleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandleSet")
            .field("open", &self.len())
            .field("leaks", &self.leak_count())
            .finish()
    }
}

/// `FileOps` for a DFS handle
pub struct DfsFile {
    handle: Arc<RemoteHandle>,
    set: Arc<RemoteHandleSet>,
}

impl DfsFile {
    pub(crate) fn new(handle: Arc<RemoteHandle>, set: Arc<RemoteHandleSet>) -> Self {
        Self { handle, set }
    }

    fn closed(&self) -> Error {
        Error::backend_op("access", &self.handle.name, "handle was closed by its resource owner")
    }
}

impl FileOps for DfsFile {
    fn backend(&self) -> BackendKind {
        BackendKind::Dfs
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let _wait = report_wait_start(WaitEvent::DataFileRead);
        let handle = &self.handle;
        let mut io = lock(&handle.io);
        match io.as_mut() {
            Some(RemoteIo::Reader { size, position }) => {
                if *position >= *size || buf.is_empty() {
                    return Ok(0);
                }
                let end = (*position + buf.len() as u64).min(*size);
                let bytes = handle
                    .connection
                    .block_on(handle.connection.store().get_range(&handle.path, *position..end))?
                    .map_err(|e| Error::backend_op("read", &handle.name, e))?;
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                *position += n as u64;
                Ok(n)
            }
            Some(RemoteIo::Writer { .. }) => Err(Error::backend_op(
                "read",
                &handle.name,
                "file is open for writing",
            )),
            None => Err(self.closed()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let _wait = report_wait_start(WaitEvent::DataFileWrite);
        let handle = &self.handle;
        let mut io = lock(&handle.io);
        match io.as_mut() {
            Some(RemoteIo::Writer { writer, written }) => {
                handle
                    .connection
                    .block_on(writer.write_all(buf))?
                    .map_err(|e| Error::backend_op("write", &handle.name, e))?;
                *written += buf.len() as u64;
                Ok(buf.len())
            }
            Some(RemoteIo::Reader { .. }) => Err(Error::backend_op(
                "write",
                &handle.name,
                "file is open for reading",
            )),
            None => Err(self.closed()),
        }
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let _ = self.seek(offset)?;
        self.read(buf)
    }

    /// Appends; remote objects are written front to back
    fn pwrite(&mut self, buf: &[u8], _offset: u64) -> Result<usize> {
        self.write(buf)
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        let mut io = lock(&self.handle.io);
        match io.as_mut() {
            Some(RemoteIo::Reader { position, .. }) => {
                *position = offset;
                Ok(offset)
            }
            Some(RemoteIo::Writer { .. }) => Err(Error::backend_op(
                "seek in",
                &self.handle.name,
                "seek is not supported on a file open for writing",
            )),
            None => Err(self.closed()),
        }
    }

    fn size(&mut self) -> Result<u64> {
        let handle = &self.handle;
        let meta = handle
            .connection
            .block_on(handle.connection.store().head(&handle.path))?
            .map_err(|e| Error::backend_op("stat", &handle.name, e))?;
        Ok(meta.size)
    }

    fn name(&self) -> &str {
        &self.handle.name
    }

    fn close(&mut self) -> Result<()> {
        let _ = self.set.remove(self.handle.id);
        self.handle.shut(true)
    }

    fn discard(&mut self) {
        let _ = self.set.remove(self.handle.id);
        if let Err(err) = self.handle.shut(false) {
            log_warn!("could not discard remote file {name}: {error}",
                      name: self.handle.name.clone(), error: err.to_string());
        }
    }
}
