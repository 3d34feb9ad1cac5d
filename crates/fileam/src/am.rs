// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The file access method traits and the `UFile` handle
//!
//! `FileAm` holds the tablespace-scoped operations (`open` is the only way to
//! obtain a handle). `FileOps` holds the per-handle operations; each backend
//! provides its own implementation and `UFile` dispatches through it.

use crate::error::{Error, Result};
use crate::types::{OpenFlags, Oid, RelFileNode};
use diagnostics::log_warn;
use std::fmt;
use std::sync::Arc;

/// Which family a file access method belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Dfs,
}

impl BackendKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Dfs => "dfs",
        }
    }
}

/// Tablespace-scoped file operations
pub trait FileAm: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Open `name` inside the file area of `spc`
    fn open(&self, spc: Oid, name: &str, flags: OpenFlags) -> Result<UFile>;

    /// Remove a file or, for a directory-like name, everything below it.
    ///
    /// Missing paths are not an error. Per-file failures are logged as
    /// warnings; only failures to reach the file area are returned.
    fn unlink(&self, spc: Oid, name: &str) -> Result<()>;

    fn exists(&self, spc: Oid, name: &str) -> Result<bool>;

    /// An access method able to unlink files of `spc` without reading the
    /// catalog again, or `None` when this one already can.
    ///
    /// Pending deletes hold on to the result, so a delete scheduled before
    /// the tablespace row goes away still reaches its files.
    fn bind_for_unlink(&self, _spc: Oid) -> Result<Option<Arc<dyn FileAm>>> {
        Ok(None)
    }

    /// Path of `name` inside the storage of the given relation
    fn format_file_name(&self, node: &RelFileNode, name: &str) -> String;
}

impl fmt::Debug for dyn FileAm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileAm({})", self.kind().name())
    }
}

/// Per-handle operations. `pread`, `pwrite` and `seek` are optional.
pub trait FileOps: Send {
    fn backend(&self) -> BackendKind;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn pread(&mut self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
        Err(Error::unsupported(self.backend().name(), "pread"))
    }

    fn pwrite(&mut self, _buf: &[u8], _offset: u64) -> Result<usize> {
        Err(Error::unsupported(self.backend().name(), "pwrite"))
    }

    fn seek(&mut self, _offset: u64) -> Result<u64> {
        Err(Error::unsupported(self.backend().name(), "seek"))
    }

    fn size(&mut self) -> Result<u64>;

    fn name(&self) -> &str;

    /// Release the handle. Called at most once by `UFile`.
    fn close(&mut self) -> Result<()>;

    /// Release the handle without finishing pending work. Used when a
    /// handle is dropped without an explicit close.
    fn discard(&mut self) {
        if let Err(err) = self.close() {
            log_warn!("could not close file {name}: {error}", name: self.name().to_string(), error: err.to_string());
        }
    }
}

/// An open file in some tablespace's file area
pub struct UFile {
    ops: Box<dyn FileOps>,
    last_error: Option<String>,
    closed: bool,
}

impl UFile {
    pub fn new(ops: Box<dyn FileOps>) -> Self {
        Self {
            ops,
            last_error: None,
            closed: false,
        }
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.ops.backend()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.ops.read(buf);
        self.record(result)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let result = self.ops.write(buf);
        self.record(result)
    }

    pub fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let result = self.ops.pread(buf, offset);
        self.record(result)
    }

    pub fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        let result = self.ops.pwrite(buf, offset);
        self.record(result)
    }

    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        let result = self.ops.seek(offset);
        self.record(result)
    }

    pub fn size(&mut self) -> Result<u64> {
        let result = self.ops.size();
        self.record(result)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.ops.name()
    }

    /// Text of the most recent failure on this handle
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Write all of `buf`, looping over short writes
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<u64> {
        let mut total = 0u64;
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                let err = Error::backend_op("write", self.name(), "wrote zero bytes");
                return self.record(Err(err));
            }
            total += n as u64;
            buf = &buf[n..];
        }
        Ok(total)
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.ops.close()
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }
}

impl Drop for UFile {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.ops.discard();
        }
    }
}

impl fmt::Debug for UFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UFile")
            .field("backend", &self.backend())
            .field("name", &self.name())
            .finish()
    }
}
