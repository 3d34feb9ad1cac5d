// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! File access methods for tablespace-scoped file areas
//!
//! A directory table stores its files in the file area of a tablespace. The
//! area is either a local directory (the [`local`] backend) or a prefix in a
//! remote object store (the [`dfs`] backend). Callers never pick a backend
//! themselves: they ask the [`FileAmResolver`] for the access method of a
//! tablespace and go through the [`FileAm`] and [`UFile`] traits.
//!
//! Ambient structure lives here as well: resource owners that close leaked
//! remote handles at transaction end, the invalidation bus that keeps the
//! caches honest, and the interrupt flag checked by long loops.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod am;
pub mod dfs;
mod error;
pub mod factory;
mod interrupt;
mod invalidation;
pub mod local;
mod lookup;
mod resolver;
mod resowner;
mod types;
pub mod wait_event;

pub use am::{BackendKind, FileAm, FileOps, UFile};
pub use error::{Error, ErrorKind, Result};
pub use factory::{DEFAULT_FILE_HANDLER, FactoryContext, FactoryRegistry, FileAmFactory, FileHandlerSpec};
pub use interrupt::{HoldoffGuard, InterruptHandle};
pub use invalidation::{InvalidationBus, InvalidationEvent, Subscriber};
pub use lookup::{DfsServerInfo, SERVER_OPTION, TablespaceInfo, TablespaceLookup};
pub use resolver::{FileAmResolver, ResolverStats};
pub use resowner::{ReleaseCallback, ReleaseContext, ReleasePhase, ResourceOwnerId, ResourceOwners};
pub use types::{
    AccessMode, BOOTSTRAP_SUPERUSER_OID, DEFAULT_TABLESPACE_OID, FIRST_NORMAL_OID,
    GLOBAL_TABLESPACE_OID, Oid, OpenFlags, RelFileNode, TABLESPACE_VERSION_DIRECTORY,
};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
/// None of the guarded structures are left half-updated by a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
