use std::fmt;
use std::ops::Range;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, TryStreamExt};

use super::{StorageError, StorageResult};

/// Streamed object body as produced by an [`ObjectStore`].
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Response to a GET against an object store.
pub struct ObjectBody {
    /// `Content-Range` header of a ranged response, if any.
    pub content_range: Option<String>,
    pub stream: BodyStream,
}

impl ObjectBody {
    /// Drain the body into one contiguous buffer.
    pub async fn collect(self) -> StorageResult<Bytes> {
        let mut buf = BytesMut::new();
        let mut stream = self.stream;
        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Minimal protocol surface the object-store backend needs from a client.
///
/// The client is shared read-only by every reader opened on a backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size of the object in bytes.
    async fn head(&self, key: &str) -> StorageResult<u64>;

    /// GET the whole object, or only `range` (end exclusive) when given.
    async fn get(&self, key: &str, range: Option<Range<u64>>) -> StorageResult<ObjectBody>;

    /// Upload `data` as the full content of `key`.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Check that the store is reachable and the bucket usable.
    async fn probe(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// `Range` header value for an end-exclusive byte range.
pub fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

/// Start offset of a `Content-Range: bytes START-END/TOTAL` value.
pub fn content_range_start(value: &str) -> Option<u64> {
    let bounds = value.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = bounds.split_once('-')?;
    start.trim().parse().ok()
}

/// Fail with [`StorageError::ContentRangeMismatch`] unless `content_range` starts at `expected`.
pub fn check_content_range(content_range: Option<&str>, expected: u64) -> StorageResult<()> {
    match content_range.and_then(content_range_start) {
        Some(start) if start == expected => Ok(()),
        _ => Err(StorageError::ContentRangeMismatch {
            expected,
            got: content_range.map(str::to_owned),
        }),
    }
}
