// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::am::{BackendKind, FileOps};
use crate::error::{Error, Result};
use crate::types::OpenFlags;
use crate::wait_event::{WaitEvent, report_wait_start};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// An open host file.
///
/// `offset` is the stream cursor used by `read` and `write`. Positional I/O
/// moves the cursor as well, so a `pwrite` followed by a `write` continues
/// where the `pwrite` stopped.
pub struct LocalFile {
    file: Option<File>,
    host_path: PathBuf,
    name: String,
    offset: u64,
}

impl LocalFile {
    pub(crate) fn open(host_path: PathBuf, name: &str, flags: OpenFlags) -> Result<Self> {
        let display = host_path.display().to_string();
        if flags.is_create() {
            if let Some(parent) = host_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::backend_op("open", &display, e))?;
            }
        }
        let file = flags
            .to_open_options()
            .open(&host_path)
            .map_err(|e| Error::backend_op("open", &display, e))?;

        Ok(Self {
            file: Some(file),
            host_path,
            name: name.to_string(),
            offset: 0,
        })
    }

    #[must_use]
    pub fn host_path(&self) -> &std::path::Path {
        &self.host_path
    }

    fn file(&mut self) -> Result<&mut File> {
        let display = self.host_path.display().to_string();
        self.file
            .as_mut()
            .ok_or_else(|| Error::backend_op("access", &display, "file is closed"))
    }

    fn display(&self) -> String {
        self.host_path.display().to_string()
    }
}

impl FileOps for LocalFile {
    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let offset = self.offset;
        self.pread(buf, offset)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let offset = self.offset;
        self.pwrite(buf, offset)
    }

    fn pread(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let display = self.display();
        let _wait = report_wait_start(WaitEvent::DataFileRead);
        let file = self.file()?;
        let _ = file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::backend_op("seek in", &display, e))?;
        let n = file
            .read(buf)
            .map_err(|e| Error::backend_op("read", &display, e))?;
        self.offset = offset + n as u64;
        Ok(n)
    }

    fn pwrite(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        let display = self.display();
        let _wait = report_wait_start(WaitEvent::DataFileWrite);
        let file = self.file()?;
        let _ = file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::backend_op("seek in", &display, e))?;
        let n = file
            .write(buf)
            .map_err(|e| Error::backend_op("write", &display, e))?;
        self.offset = offset + n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        self.offset = offset;
        Ok(offset)
    }

    fn size(&mut self) -> Result<u64> {
        let display = self.display();
        let metadata = self
            .file()?
            .metadata()
            .map_err(|e| Error::backend_op("stat", &display, e))?;
        Ok(metadata.len())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // std reports no close(2) errors on drop.
        drop(self.file.take());
        Ok(())
    }
}
