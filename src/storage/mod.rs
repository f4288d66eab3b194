//! Storage backends for archived files.
//!
//! A [`Backend`] is chosen once from [`StorageConfig`] and then used only
//! through the [`StorageBackend`] capability trait: size lookup, a plain
//! forward-only reader, a writer, and a seekable reader.

mod config;
mod error;
mod http;
mod object;
mod object_store;
mod posix;
mod s3;
mod seekable;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub use config::{
    BackendKind, PosixConfig, S3Config, StorageConfig, DEFAULT_CHUNK_SIZE,
    DEFAULT_NON_EXIST_RETRY_TIME,
};
pub use error::{StorageError, StorageResult};
pub use http::HttpStore;
pub use object::ObjectBackend;
pub use object_store::{
    check_content_range, content_range_start, range_header, BodyStream, ObjectBody, ObjectStore,
};
pub use posix::PosixBackend;
pub use s3::S3Store;
pub use seekable::{SeekableObjectReader, DEFAULT_PREFETCH_SIZE, MIN_PREFETCH_SIZE};

use crate::io::SeekableRead;

/// Forward-only reader over one stored file.
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;
/// Writer replacing the content of one stored file.
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Random-access reader over one stored file.
pub type FileReadSeeker = Box<dyn SeekableRead>;

/// Capabilities every storage backend offers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get_file_size(&self, path: &str) -> StorageResult<u64>;

    async fn new_file_reader(&self, path: &str) -> StorageResult<FileReader>;

    async fn new_file_writer(&self, path: &str) -> StorageResult<FileWriter>;

    async fn new_file_read_seeker(&self, path: &str) -> StorageResult<FileReadSeeker>;
}

/// The configured backend.
pub enum Backend {
    Posix(PosixBackend),
    Object(ObjectBackend),
}

impl Backend {
    /// Build the backend selected by `config`, failing fast when the
    /// location or store is unusable.
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        match config.kind {
            BackendKind::Posix => Ok(Backend::Posix(PosixBackend::new(&config.posix)?)),
            BackendKind::S3 => {
                let store = S3Store::new(&config.s3)?;
                Self::object(Arc::new(store), &config.s3).await
            }
            BackendKind::Http => {
                let store = HttpStore::new(&config.s3)?;
                Self::object(Arc::new(store), &config.s3).await
            }
        }
    }

    async fn object(store: Arc<dyn ObjectStore>, config: &S3Config) -> StorageResult<Self> {
        store.probe().await?;
        Ok(Backend::Object(ObjectBackend::new(store, config)))
    }

    fn inner(&self) -> &dyn StorageBackend {
        match self {
            Backend::Posix(backend) => backend,
            Backend::Object(backend) => backend,
        }
    }
}

#[async_trait]
impl StorageBackend for Backend {
    async fn get_file_size(&self, path: &str) -> StorageResult<u64> {
        self.inner().get_file_size(path).await
    }

    async fn new_file_reader(&self, path: &str) -> StorageResult<FileReader> {
        self.inner().new_file_reader(path).await
    }

    async fn new_file_writer(&self, path: &str) -> StorageResult<FileWriter> {
        self.inner().new_file_writer(path).await
    }

    async fn new_file_read_seeker(&self, path: &str) -> StorageResult<FileReadSeeker> {
        self.inner().new_file_read_seeker(path).await
    }
}
