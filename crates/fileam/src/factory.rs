// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// File access method registration using linkme
//
// A tablespace names its access method with a `"library,symbol"` file
// handler. Each access method registers a factory under that pair at link
// time; the resolver finds it here and calls it with the session's context.

use crate::am::FileAm;
use crate::dfs::{ConnectionCache, RemoteHandleSet};
use crate::error::{Error, Result};
use crate::lookup::TablespaceLookup;
use crate::resowner::ResourceOwners;
use linkme::distributed_slice;
use std::fmt;
use std::sync::Arc;

/// Handler of tablespaces created with a `server` option
pub const DEFAULT_FILE_HANDLER: &str = "ufs,dfs_file_am";

/// A parsed `"library,symbol"` file handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandlerSpec {
    pub library: String,
    pub symbol: String,
}

impl FileHandlerSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || {
            Error::invalid_parameter(format!(
                "invalid file handler \"{spec}\": expected \"library,symbol\""
            ))
        };
        let mut parts = spec.split(',').map(str::trim);
        let library = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        let symbol = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            library: library.to_string(),
            symbol: symbol.to_string(),
        })
    }
}

impl fmt::Display for FileHandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.library, self.symbol)
    }
}

/// What a factory may use to build its access method
#[derive(Clone)]
pub struct FactoryContext {
    pub lookup: Arc<dyn TablespaceLookup>,
    pub owners: ResourceOwners,
    pub connections: Arc<ConnectionCache>,
    pub remote_handles: Arc<RemoteHandleSet>,
    /// The session's local access method. A factory must not hand it back.
    pub local: Arc<dyn FileAm>,
    pub remote_block_size: usize,
}

impl fmt::Debug for FactoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryContext")
            .field("connections", &self.connections)
            .field("remote_handles", &self.remote_handles)
            .field("remote_block_size", &self.remote_block_size)
            .finish()
    }
}

/// A registered file access method factory
#[derive(Debug)]
pub struct FileAmFactory {
    pub library: &'static str,
    pub symbol: &'static str,
    pub description: &'static str,
    /// Returns `None` when the factory cannot produce an access method
    pub create: fn(context: &FactoryContext) -> Option<Arc<dyn FileAm>>,
}

/// Distributed slice containing all registered factories
#[distributed_slice]
pub static FILE_AM_FACTORIES: [FileAmFactory];

pub struct FactoryRegistry;

impl FactoryRegistry {
    #[must_use]
    pub fn get_factory(spec: &FileHandlerSpec) -> Option<&'static FileAmFactory> {
        FILE_AM_FACTORIES
            .iter()
            .find(|factory| factory.library == spec.library && factory.symbol == spec.symbol)
    }

    #[must_use]
    pub fn list_factories() -> &'static [FileAmFactory] {
        &FILE_AM_FACTORIES
    }

    /// Find the factory for `spec`, reporting an unknown pair the way a
    /// failed symbol lookup would
    pub fn require(spec: &FileHandlerSpec) -> Result<&'static FileAmFactory> {
        Self::get_factory(spec).ok_or_else(|| {
            Error::undefined_object(format!(
                "could not find function \"{}\" in file \"{}\"",
                spec.symbol, spec.library
            ))
        })
    }
}

/// Register a file access method factory under `library,symbol`
#[macro_export]
macro_rules! register_file_am_factory {
    (
        library: $library:literal,
        symbol: $symbol:ident,
        description: $description:expr,
        create: $create_fn:expr
    ) => {
        paste::paste! {
            #[linkme::distributed_slice($crate::factory::FILE_AM_FACTORIES)]
            static [<FILE_AM_FACTORY_ $symbol:upper>]: $crate::factory::FileAmFactory = $crate::factory::FileAmFactory {
                library: $library,
                symbol: stringify!($symbol),
                description: $description,
                create: $create_fn,
            };
        }
    };
}

fn create_dfs_file_am(context: &FactoryContext) -> Option<Arc<dyn FileAm>> {
    Some(Arc::new(crate::dfs::DfsFileAm::new(
        context.lookup.clone(),
        context.owners.clone(),
        context.connections.clone(),
        context.remote_handles.clone(),
        context.remote_block_size,
    )))
}

crate::register_file_am_factory! {
    library: "ufs",
    symbol: dfs_file_am,
    description: "Object-store backed file areas for DFS tablespaces",
    create: create_dfs_file_am
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_handler_spec() {
        let spec = FileHandlerSpec::parse("ufs,dfs_file_am").unwrap();
        assert_eq!(spec.library, "ufs");
        assert_eq!(spec.symbol, "dfs_file_am");
        assert_eq!(spec.to_string(), DEFAULT_FILE_HANDLER);

        for bad in ["ufs", ",sym", "lib,", "a,b,c", ""] {
            let err = FileHandlerSpec::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{bad}");
        }
    }

    #[test]
    fn test_builtin_factory_is_registered() {
        let spec = FileHandlerSpec::parse(DEFAULT_FILE_HANDLER).unwrap();
        let factory = FactoryRegistry::require(&spec).unwrap();
        assert_eq!(factory.library, "ufs");
        assert!(FactoryRegistry::list_factories().len() >= 1);

        let missing = FileHandlerSpec::parse("ufs,nope").unwrap();
        assert_eq!(
            FactoryRegistry::require(&missing).unwrap_err().kind(),
            ErrorKind::UndefinedObject
        );
    }
}
