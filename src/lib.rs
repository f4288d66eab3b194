//! # sda-storage
//!
//! Storage layer of a sensitive-data archive download service.
//!
//! Archived files live either below a local directory or in an
//! S3-compatible object store. Downloads need arbitrary byte ranges of
//! multi-gigabyte objects, so the object-store backend hands out a
//! [`SeekableObjectReader`] that hides round-trip latency behind a
//! background, duplicate-suppressing prefetch cache. When a file is
//! delivered with a re-encrypted header, [`SeekableMultiReader`] splices
//! the new header and the untouched archive body into one seekable stream.
//!
//! ## Example
//!
//! ```no_run
//! use std::io::SeekFrom;
//! use sda_storage::{Backend, BackendKind, MemoryReader, SeekableMultiReader, SeekableRead,
//!     StorageBackend, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = StorageConfig::default();
//!     config.kind = BackendKind::S3;
//!     config.s3.endpoint = "https://s3.example.org:9000".to_string();
//!     config.s3.bucket = "archive".to_string();
//!
//!     let backend = Backend::new(&config).await?;
//!     let body = backend.new_file_read_seeker("dataset/file.c4gh").await?;
//!     let header = MemoryReader::new(b"re-encrypted header".to_vec());
//!
//!     let parts: Vec<Box<dyn SeekableRead>> = vec![Box::new(header), body];
//!     let mut stream = SeekableMultiReader::new(parts).await?;
//!     stream.seek(SeekFrom::Start(1024)).await?;
//!
//!     let mut buf = vec![0u8; 4096];
//!     let n = stream.read(&mut buf).await?;
//!     println!("read {} bytes", n);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod storage;

pub use cli::Cli;
pub use io::{copy_to, MemoryReader, ReadStatus, SeekableMultiReader, SeekableRead};
pub use storage::{
    Backend, BackendKind, ObjectStore, SeekableObjectReader, StorageBackend, StorageConfig,
    StorageError, StorageResult,
};
