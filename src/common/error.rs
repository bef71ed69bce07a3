use std::path::PathBuf;

use thiserror::Error;

use super::types::PageId;

/// Coarse classification of [`SdbError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Corrupt,
    Capacity,
    Io,
    SchemaMismatch,
    InvalidArgument,
}

/// Storage error types
#[derive(Error, Debug)]
pub enum SdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("File {0} not found")]
    FileNotFound(PathBuf),

    #[error("Page directory file {0} not found")]
    DirectoryNotFound(PathBuf),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Index {0} already exists")]
    IndexAlreadyExists(String),

    #[error("Invalid index name {0:?}")]
    InvalidIndexName(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Invalid capacity {0}: capacity must be at least 1")]
    InvalidCapacity(usize),

    #[error("Invalid B-tree order {order}: must be at least {min} and fit in 16 bits")]
    InvalidBTreeOrder { order: usize, min: usize },

    #[error("Invalid page length: expected {expected} bytes, got {actual}")]
    InvalidPageLength { expected: usize, actual: usize },

    #[error("Column {column}: unsupported value type {found}")]
    SchemaMismatch { column: usize, found: &'static str },

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Range {offset}..{offset}+{len} is outside the page")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Page overflow: tuple size {tuple_size} exceeds available space {available}")]
    PageOverflow { tuple_size: usize, available: usize },

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),
}

impl SdbError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        SdbError::Corrupt(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SdbError::Io(_) | SdbError::DiskScheduler(_) => ErrorKind::Io,
            SdbError::PageNotFound(_)
            | SdbError::FileNotFound(_)
            | SdbError::DirectoryNotFound(_)
            | SdbError::IndexNotFound(_) => ErrorKind::NotFound,
            SdbError::Corrupt(_) => ErrorKind::Corrupt,
            SdbError::InvalidCapacity(_) | SdbError::InvalidBTreeOrder { .. } => {
                ErrorKind::Capacity
            }
            SdbError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            SdbError::IndexAlreadyExists(_)
            | SdbError::InvalidIndexName(_)
            | SdbError::InvalidPageLength { .. }
            | SdbError::InvalidKeyLength { .. }
            | SdbError::OutOfBounds { .. }
            | SdbError::PageOverflow { .. } => ErrorKind::InvalidArgument,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_corrupt(&self) -> bool {
        self.kind() == ErrorKind::Corrupt
    }
}

pub type Result<T> = std::result::Result<T, SdbError>;
