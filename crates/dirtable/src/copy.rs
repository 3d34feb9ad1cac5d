// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Moving file contents in and out of directory tables

use crate::error::{Result, duplicate_object, invalid_parameter, undefined_object};
use crate::row::{DirectoryRow, TupleDesc, form_directory_row};
use crate::session::Session;
use diagnostics::{log_debug, log_info};
use fileam::OpenFlags;
use fileam::Oid;
use std::io::Read;

/// Chunk size of [`Session::file_content`]
pub const READ_CHUNK_SIZE: usize = 4096;

impl Session {
    /// Store the bytes of `reader` as `name` under the table's location and
    /// add its metadata row. The file is removed again if the transaction
    /// aborts.
    pub fn copy_from(
        &mut self,
        rel_id: Oid,
        name: &str,
        reader: &mut dyn Read,
        tag: Option<&str>,
    ) -> Result<DirectoryRow> {
        self.require_transaction()?;
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return Err(invalid_parameter("file name must not be empty"));
        }

        let table = self.get_directory_table(rel_id)?;
        let relative_path = format!("{}/{name}", table.location);
        if self.catalog.read(|data| {
            data.files
                .get(&rel_id)
                .is_some_and(|files| files.contains_key(&relative_path))
        }) {
            return Err(duplicate_object(format!(
                "file \"{relative_path}\" already exists in directory table {rel_id}"
            )));
        }
        let tablespace_name = self
            .catalog
            .read(|data| data.tablespaces.get(&table.tablespace_id).map(|spc| spc.name.clone()))
            .ok_or_else(|| {
                undefined_object(format!("tablespace \"{}\" does not exist", table.tablespace_id))
            })?;

        let path = format!("/{relative_path}");
        let am = self.resolver.get(table.tablespace_id)?;
        let unlink_am = am.bind_for_unlink(table.tablespace_id)?.unwrap_or_else(|| am.clone());
        let mut file = am.open(table.tablespace_id, &path, OpenFlags::CREAT | OpenFlags::WRONLY)?;
        let level = self.nest_level();
        self.pending
            .add_create_pending(unlink_am, table.tablespace_id, &path, level);

        let mut buffer = vec![0u8; self.config.copy_buffer_size.max(1)];
        let mut size: u64 = 0;
        loop {
            self.check_for_interrupts()?;
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            size += file.write_all(&buffer[..n])?;
        }
        file.close()?;

        let tuple = form_directory_row(
            &TupleDesc::directory_table(),
            &tablespace_name,
            &relative_path,
            size,
            &chrono::Local::now(),
        )?;
        let row = DirectoryRow::from_tuple(&tuple)?.with_tag(tag);

        self.catalog.modify(|data| -> Result<()> {
            let files = data.files.entry(rel_id).or_default();
            if files.contains_key(&relative_path) {
                return Err(duplicate_object(format!(
                    "file \"{relative_path}\" already exists in directory table {rel_id}"
                )));
            }
            let _ = files.insert(relative_path.clone(), row.clone());
            Ok(())
        })?;
        self.catalog.command_counter_increment();

        log_info!("Copied {size} bytes into {url}", size: size, url: row.scoped_file_url.clone());
        Ok(row)
    }

    /// Contents of the file at `/<tablespace>/<relative path>`
    pub fn file_content(&self, scoped_url: &str) -> Result<Vec<u8>> {
        self.require_transaction()?;
        let invalid = || invalid_parameter(format!("invalid scoped file url \"{scoped_url}\""));
        let (tablespace_name, relative_path) = scoped_url
            .strip_prefix('/')
            .and_then(|rest| rest.split_once('/'))
            .filter(|(spc, path)| !spc.is_empty() && !path.is_empty())
            .ok_or_else(invalid)?;

        let spc = self.tablespace_oid(tablespace_name)?;
        let am = self.resolver.get(spc)?;
        let mut file = am.open(spc, &format!("/{relative_path}"), OpenFlags::RDONLY)?;

        let mut content = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            self.check_for_interrupts()?;
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
        }
        file.close()?;
        log_debug!("Read {size} bytes from {url}", size: content.len(), url: scoped_url.to_string());
        Ok(content)
    }

    /// Delete a file's metadata row now and the file itself at commit
    pub fn remove_file(&mut self, rel_id: Oid, relative_path: &str) -> Result<DirectoryRow> {
        self.require_transaction()?;
        let table = self.get_directory_table(rel_id)?;
        let relative_path = relative_path.trim_start_matches('/');

        let row = self.catalog.modify(|data| -> Result<DirectoryRow> {
            data.files
                .get_mut(&rel_id)
                .and_then(|files| files.remove(relative_path))
                .ok_or_else(|| {
                    undefined_object(format!(
                        "file \"{relative_path}\" does not exist in directory table {rel_id}"
                    ))
                })
        })?;
        let am = self.unlink_target(table.tablespace_id)?;
        let level = self.nest_level();
        self.pending
            .add_delete_pending(am, table.tablespace_id, &format!("/{relative_path}"), level);
        self.catalog.command_counter_increment();
        Ok(row)
    }

    /// Metadata rows ordered by relative path
    pub fn list_files(&self, rel_id: Oid) -> Result<Vec<DirectoryRow>> {
        if !self.directory_table_exists(rel_id) {
            return Err(crate::error::catalog_lookup(format!(
                "cache lookup failed for directory table {rel_id}"
            )));
        }
        Ok(self.catalog.read(|data| {
            data.files
                .get(&rel_id)
                .map(|files| files.values().cloned().collect())
                .unwrap_or_default()
        }))
    }
}
