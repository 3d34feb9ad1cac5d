// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Local file access method -- tablespace file areas on the host filesystem
//!
//! The default tablespace stores files under `<data_dir>/base/<db>`. Any other
//! local tablespace is reached through `<data_dir>/pg_tblspc/<spc>`, which
//! points at the directory given when the tablespace was created, and then
//! through a per-version directory and the database id.
//!
//! Names handed to [`LocalFileAm`] are relative to the file area; a leading
//! `/` is accepted and ignored. Names that climb out of the area with `..`
//! are rejected.

mod file;

#[cfg(test)]
mod tests;

pub use file::LocalFile;

use crate::am::{BackendKind, FileAm, UFile};
use crate::error::{Error, Result};
use crate::types::{
    DEFAULT_TABLESPACE_OID, OpenFlags, Oid, RelFileNode, TABLESPACE_VERSION_DIRECTORY,
};
use diagnostics::{log_debug, log_warn};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};

/// Directory under the data directory that links to local tablespaces
pub const TABLESPACE_LINK_DIR: &str = "pg_tblspc";

/// Directory under the data directory holding the default tablespace
pub const DEFAULT_AREA_DIR: &str = "base";

/// POSIX-backed file access method
#[derive(Debug, Clone)]
pub struct LocalFileAm {
    data_dir: PathBuf,
    database_id: Oid,
}

impl LocalFileAm {
    pub fn new(data_dir: PathBuf, database_id: Oid) -> Self {
        Self {
            data_dir,
            database_id,
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn database_id(&self) -> Oid {
        self.database_id
    }

    /// Host directory of the link for a non-default tablespace
    #[must_use]
    pub fn tablespace_link(&self, spc: Oid) -> PathBuf {
        self.data_dir.join(TABLESPACE_LINK_DIR).join(spc.to_string())
    }

    /// Host directory holding the files of `spc` for this database
    #[must_use]
    pub fn area(&self, spc: Oid) -> PathBuf {
        if spc == DEFAULT_TABLESPACE_OID || !spc.is_valid() {
            self.data_dir
                .join(DEFAULT_AREA_DIR)
                .join(self.database_id.to_string())
        } else {
            self.tablespace_link(spc)
                .join(TABLESPACE_VERSION_DIRECTORY)
                .join(self.database_id.to_string())
        }
    }

    /// Host path of `name` inside the file area of `spc`
    pub fn resolve(&self, spc: Oid, name: &str) -> Result<PathBuf> {
        let relative = relative_name(name)?;
        Ok(self.area(spc).join(relative))
    }
}

/// Validate a file-area name and strip its leading separators
pub(crate) fn relative_name(name: &str) -> Result<&Path> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(Error::invalid_parameter(format!(
            "invalid file name \"{name}\": empty path"
        )));
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(Error::invalid_parameter(format!(
                    "invalid file name \"{name}\": path must stay inside the file area"
                )));
            }
        }
    }
    Ok(path)
}

impl FileAm for LocalFileAm {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn open(&self, spc: Oid, name: &str, flags: OpenFlags) -> Result<UFile> {
        let path = self.resolve(spc, name)?;
        let file = LocalFile::open(path, name, flags)?;
        Ok(UFile::new(Box::new(file)))
    }

    fn unlink(&self, spc: Oid, name: &str) -> Result<()> {
        let path = self.resolve(spc, name)?;
        let display = path.display().to_string();

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                log_warn!("could not remove file or directory \"{path}\": {error}",
                          path: display, error: err.to_string());
                return Ok(());
            }
            Err(err) => {
                log_warn!("could not stat file or directory \"{path}\": {error}",
                          path: display, error: err.to_string());
                return Ok(());
            }
        };

        if metadata.is_dir() {
            let removed = remove_tree(&path);
            log_debug!("Removed directory {path} ({removed} entries)", path: display, removed: removed);
        } else if let Err(err) = std::fs::remove_file(&path) {
            log_warn!("could not remove file \"{path}\": {error}", path: display, error: err.to_string());
        }
        Ok(())
    }

    fn exists(&self, spc: Oid, name: &str) -> Result<bool> {
        let path = self.resolve(spc, name)?;
        match std::fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::backend_op("stat", &path.display().to_string(), err)),
        }
    }

    fn format_file_name(&self, node: &RelFileNode, name: &str) -> String {
        let name = name.trim_start_matches('/');
        if node.spc_node == DEFAULT_TABLESPACE_OID {
            format!("{DEFAULT_AREA_DIR}/{}/{name}", node.db_node)
        } else {
            format!(
                "{TABLESPACE_LINK_DIR}/{}/{TABLESPACE_VERSION_DIRECTORY}/{}/{}_dirtable/{name}",
                node.spc_node, node.db_node, node.rel_node
            )
        }
    }
}

/// Remove `dir` and everything below it. Failures are logged and skipped so
/// that one stubborn entry does not keep its siblings alive. Returns the
/// number of entries removed.
fn remove_tree(dir: &Path) -> usize {
    let mut removed = 0;
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        log_warn!("could not read directory \"{path}\": {error}",
                                  path: dir.display().to_string(), error: err.to_string());
                        continue;
                    }
                };
                let path = entry.path();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    removed += remove_tree(&path);
                } else {
                    match std::fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            log_warn!("could not remove file \"{path}\": {error}",
                                      path: path.display().to_string(), error: err.to_string());
                        }
                    }
                }
            }
        }
        Err(err) => {
            log_warn!("could not open directory \"{path}\": {error}",
                      path: dir.display().to_string(), error: err.to_string());
        }
    }

    match std::fs::remove_dir(dir) {
        Ok(()) => removed += 1,
        Err(err) => {
            log_warn!("could not remove directory \"{path}\": {error}",
                      path: dir.display().to_string(), error: err.to_string());
        }
    }
    removed
}
