// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Identifiers and open flags shared by every file access method

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Object identifier for catalog rows (roles, tablespaces, relations, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(pub u32);

impl Oid {
    pub const INVALID: Oid = Oid(0);

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Oid {
    fn from(value: u32) -> Self {
        Oid(value)
    }
}

/// The database's default tablespace (`pg_default`)
pub const DEFAULT_TABLESPACE_OID: Oid = Oid(1663);

/// The shared tablespace (`pg_global`); user relations never live here
pub const GLOBAL_TABLESPACE_OID: Oid = Oid(1664);

/// Bootstrap superuser
pub const BOOTSTRAP_SUPERUSER_OID: Oid = Oid(10);

/// First oid handed out to user-created objects
pub const FIRST_NORMAL_OID: u32 = 16384;

/// Per-version directory inside a non-default tablespace
pub const TABLESPACE_VERSION_DIRECTORY: &str = "DT_1_202501";

/// Physical identity of a relation's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelFileNode {
    pub spc_node: Oid,
    pub db_node: Oid,
    pub rel_node: Oid,
}

/// POSIX-style open flags understood by every backend
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

/// Access mode half of [`OpenFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags(0o0);
    pub const WRONLY: OpenFlags = OpenFlags(0o1);
    pub const RDWR: OpenFlags = OpenFlags(0o2);
    pub const CREAT: OpenFlags = OpenFlags(0o100);
    pub const EXCL: OpenFlags = OpenFlags(0o200);
    pub const TRUNC: OpenFlags = OpenFlags(0o1000);
    pub const APPEND: OpenFlags = OpenFlags(0o2000);

    const ACCMODE: u32 = 0o3;

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn access_mode(self) -> AccessMode {
        match self.0 & Self::ACCMODE {
            0o1 => AccessMode::WriteOnly,
            0o2 => AccessMode::ReadWrite,
            _ => AccessMode::ReadOnly,
        }
    }

    /// True when every non-access-mode bit of `other` is set
    #[must_use]
    pub fn has(self, other: OpenFlags) -> bool {
        let bits = other.0 & !Self::ACCMODE;
        self.0 & bits == bits
    }

    #[must_use]
    pub fn is_create(self) -> bool {
        self.has(Self::CREAT)
    }

    #[must_use]
    pub fn is_write(self) -> bool {
        self.access_mode() != AccessMode::ReadOnly
    }

    /// Translate to `std::fs::OpenOptions`
    #[must_use]
    pub fn to_open_options(self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        match self.access_mode() {
            AccessMode::ReadOnly => options.read(true),
            AccessMode::WriteOnly => options.write(true),
            AccessMode::ReadWrite => options.read(true).write(true),
        };
        if self.has(Self::APPEND) {
            options.append(true);
        }
        if self.has(Self::TRUNC) {
            options.truncate(true);
        }
        if self.has(Self::CREAT) && self.has(Self::EXCL) {
            options.create_new(true);
        } else if self.has(Self::CREAT) {
            options.create(true);
        }
        options
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![match self.access_mode() {
            AccessMode::ReadOnly => "O_RDONLY",
            AccessMode::WriteOnly => "O_WRONLY",
            AccessMode::ReadWrite => "O_RDWR",
        }];
        for (flag, name) in [
            (Self::CREAT, "O_CREAT"),
            (Self::EXCL, "O_EXCL"),
            (Self::TRUNC, "O_TRUNC"),
            (Self::APPEND, "O_APPEND"),
        ] {
            if self.has(flag) {
                parts.push(name);
            }
        }
        write!(f, "{}", parts.join("|"))
    }
}
