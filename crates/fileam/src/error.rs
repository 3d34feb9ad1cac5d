// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub type Result<T> = std::result::Result<T, Error>;

/// Category of an error as seen by callers across the storage boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    CatalogLookup,
    InsufficientPrivilege,
    DuplicateObject,
    UndefinedObject,
    ReservedName,
    InvalidObjectDefinition,
    FileBackend,
    Unsupported,
    Canceled,
}

/// Errors raised by file access methods and the structures around them
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    CatalogLookup(String),

    #[error("{0}")]
    InsufficientPrivilege(String),

    #[error("{0}")]
    DuplicateObject(String),

    #[error("{0}")]
    UndefinedObject(String),

    #[error("{0}")]
    ReservedName(String),

    #[error("{0}")]
    InvalidObjectDefinition(String),

    /// Backend failure carrying the backend's own error text
    #[error("{message}")]
    FileBackend { message: String },

    #[error("{backend} file access method does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("canceling statement due to user request")]
    Canceled,
}

impl Error {
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub fn catalog_lookup<S: Into<String>>(msg: S) -> Self {
        Error::CatalogLookup(msg.into())
    }

    pub fn insufficient_privilege<S: Into<String>>(msg: S) -> Self {
        Error::InsufficientPrivilege(msg.into())
    }

    pub fn duplicate_object<S: Into<String>>(msg: S) -> Self {
        Error::DuplicateObject(msg.into())
    }

    pub fn undefined_object<S: Into<String>>(msg: S) -> Self {
        Error::UndefinedObject(msg.into())
    }

    pub fn reserved_name<S: Into<String>>(msg: S) -> Self {
        Error::ReservedName(msg.into())
    }

    pub fn invalid_object_definition<S: Into<String>>(msg: S) -> Self {
        Error::InvalidObjectDefinition(msg.into())
    }

    pub fn file_backend<S: Into<String>>(msg: S) -> Self {
        Error::FileBackend {
            message: msg.into(),
        }
    }

    /// Wrap a backend failure with the operation and path it hit
    pub fn backend_op<E: std::fmt::Display>(operation: &str, path: &str, err: E) -> Self {
        Error::file_backend(format!("failed to {operation} file \"{path}\": {err}"))
    }

    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        Error::Unsupported { backend, operation }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Error::CatalogLookup(_) => ErrorKind::CatalogLookup,
            Error::InsufficientPrivilege(_) => ErrorKind::InsufficientPrivilege,
            Error::DuplicateObject(_) => ErrorKind::DuplicateObject,
            Error::UndefinedObject(_) => ErrorKind::UndefinedObject,
            Error::ReservedName(_) => ErrorKind::ReservedName,
            Error::InvalidObjectDefinition(_) => ErrorKind::InvalidObjectDefinition,
            Error::FileBackend { .. } => ErrorKind::FileBackend,
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::Canceled => ErrorKind::Canceled,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::file_backend(err.to_string())
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Error {
        Error::file_backend(err.to_string())
    }
}
