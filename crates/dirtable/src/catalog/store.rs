// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Where committed catalog state lives between sessions

use super::CatalogData;
use crate::error::{DirTableError, Result};
use crate::lock;
use diagnostics::log_debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// File name of the JSON catalog inside a home directory
pub const CATALOG_FILE: &str = "catalog.json";

pub trait CatalogStore: Send {
    /// The last saved catalog, or `None` when nothing was saved yet
    fn load(&self) -> Result<Option<CatalogData>>;

    /// Replace the saved catalog. Called once per top-level commit.
    fn save(&self, data: &CatalogData) -> Result<()>;
}

/// Keeps the catalog in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<CatalogData>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        *lock(&self.saves)
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> Result<Option<CatalogData>> {
        Ok(lock(&self.saved).clone())
    }

    fn save(&self, data: &CatalogData) -> Result<()> {
        *lock(&self.saved) = Some(data.clone());
        *lock(&self.saves) += 1;
        Ok(())
    }
}

impl<S: CatalogStore + Sync> CatalogStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<CatalogData>> {
        self.as_ref().load()
    }

    fn save(&self, data: &CatalogData) -> Result<()> {
        self.as_ref().save(data)
    }
}

/// Pretty JSON in a single file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store for the catalog file inside `home`
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join(CATALOG_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> Result<Option<CatalogData>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(DirTableError::store(&self.path, err)),
        };
        let data: CatalogData = serde_json::from_str(&text)?;
        data.validate()?;
        log_debug!("Loaded catalog {system_id} from {path}",
                   system_id: data.system_id.clone(), path: self.path.display().to_string());
        Ok(Some(data))
    }

    fn save(&self, data: &CatalogData) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| DirTableError::store(dir, e))?;

        let bytes = serde_json::to_vec_pretty(data)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DirTableError::store(dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.flush())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| DirTableError::store(tmp.path(), e))?;
        let _ = tmp
            .persist(&self.path)
            .map_err(|e| DirTableError::store(&self.path, e.error))?;
        Ok(())
    }
}
