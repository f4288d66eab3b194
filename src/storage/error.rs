use std::io;

use thiserror::Error;

/// Errors produced by storage backends and the readers they hand out.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Seek target lies outside `[0, size]`; reader state is unchanged.
    #[error("invalid seek: {0}")]
    InvalidSeek(String),

    /// The store answered a range request with a different range.
    #[error("unexpected content range {got:?}, expected start {expected}")]
    ContentRangeMismatch { expected: u64, got: Option<String> },

    /// Object or file does not exist. Never retried.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Network or server side failure that may succeed on retry.
    #[error("transient fetch error: {0}")]
    Transient(String),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("invalid storage configuration: {0}")]
    Config(String),

    /// A component handed to the multi-segment stream could not be probed.
    #[error("reader {index} is not seekable: {source}")]
    NotSeekable {
        index: usize,
        #[source]
        source: Box<StorageError>,
    },

    /// A component ended before the size it reported at construction.
    #[error("component {index} ended early at local offset {offset}")]
    UnexpectedEof { index: usize, offset: u64 },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Returns true if the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Whether the backend retry policy may try the call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

impl From<StorageError> for io::Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(inner) => inner,
            StorageError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, e),
            StorageError::InvalidSeek(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            StorageError::UnexpectedEof { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            other => io::Error::other(other),
        }
    }
}
