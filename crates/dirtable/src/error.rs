// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// Error types for directory table operations

use fileam::ErrorKind;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, DirTableError>;

#[derive(Debug, thiserror::Error)]
pub enum DirTableError {
    #[error(transparent)]
    FileAm(#[from] fileam::Error),

    #[error("Catalog store error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no transaction is in progress")]
    NoTransaction,

    #[error("there is already a transaction in progress")]
    TransactionInProgress,

    #[error("savepoint \"{0}\" does not exist")]
    NoSuchSavepoint(String),
}

impl DirTableError {
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DirTableError::Store {
            path: path.into(),
            source,
        }
    }

    /// Boundary category. Errors that never cross the storage boundary
    /// report `None`.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DirTableError::FileAm(err) => Some(err.kind()),
            DirTableError::Io(_) => Some(ErrorKind::FileBackend),
            DirTableError::NoSuchSavepoint(_) => Some(ErrorKind::UndefinedObject),
            DirTableError::Store { .. }
            | DirTableError::Json(_)
            | DirTableError::Yaml(_)
            | DirTableError::NoTransaction
            | DirTableError::TransactionInProgress => None,
        }
    }
}

// Shorthands for the categories raised by catalog commands.

pub(crate) fn invalid_parameter(msg: impl Into<String>) -> DirTableError {
    fileam::Error::invalid_parameter(msg).into()
}

pub(crate) fn catalog_lookup(msg: impl Into<String>) -> DirTableError {
    fileam::Error::catalog_lookup(msg).into()
}

pub(crate) fn insufficient_privilege(msg: impl Into<String>) -> DirTableError {
    fileam::Error::insufficient_privilege(msg).into()
}

pub(crate) fn duplicate_object(msg: impl Into<String>) -> DirTableError {
    fileam::Error::duplicate_object(msg).into()
}

pub(crate) fn undefined_object(msg: impl Into<String>) -> DirTableError {
    fileam::Error::undefined_object(msg).into()
}

pub(crate) fn reserved_name(msg: impl Into<String>) -> DirTableError {
    fileam::Error::reserved_name(msg).into()
}

pub(crate) fn invalid_object_definition(msg: impl Into<String>) -> DirTableError {
    fileam::Error::invalid_object_definition(msg).into()
}
