use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use tokio::io::AsyncWrite;
use tokio::time::Instant;
use tokio_util::io::StreamReader;

use super::{
    FileReadSeeker, FileReader, FileWriter, ObjectStore, S3Config, SeekableObjectReader,
    StorageBackend, StorageResult,
};

/// Pause between attempts of a retried metadata or plain-reader call.
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Backend over an S3-compatible object store.
pub struct ObjectBackend {
    store: Arc<dyn ObjectStore>,
    chunk_size: u64,
    retry_time: Duration,
}

impl ObjectBackend {
    /// Wrap `store` with the retry window and chunk size from `config`.
    pub fn new(store: Arc<dyn ObjectStore>, config: &S3Config) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size,
            retry_time: config.non_exist_retry_time,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or the retry window closes.
    async fn with_retry<T, F, Fut>(&self, what: &str, path: &str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let start = Instant::now();
        let mut attempt = 1u32;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && start.elapsed() < self.retry_time => {
                    tracing::warn!("{} of {} failed (attempt {}): {}", what, path, attempt, e);
                    attempt += 1;
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => {
                    tracing::error!("{} of {} failed: {}", what, path, e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectBackend {
    async fn get_file_size(&self, path: &str) -> StorageResult<u64> {
        self.with_retry("size lookup", path, || self.store.head(path)).await
    }

    async fn new_file_reader(&self, path: &str) -> StorageResult<FileReader> {
        let body = self
            .with_retry("download", path, || self.store.get(path, None))
            .await?;
        Ok(Box::new(StreamReader::new(body.stream)))
    }

    async fn new_file_writer(&self, path: &str) -> StorageResult<FileWriter> {
        Ok(Box::new(ObjectWriter::new(Arc::clone(&self.store), path)))
    }

    async fn new_file_read_seeker(&self, path: &str) -> StorageResult<FileReadSeeker> {
        let size = self.get_file_size(path).await?;
        Ok(Box::new(SeekableObjectReader::new(
            Arc::clone(&self.store),
            path,
            size,
            self.chunk_size,
        )))
    }
}

enum WriterState {
    Buffering(BytesMut),
    Uploading(BoxFuture<'static, StorageResult<()>>),
    Closed,
}

/// Collects written bytes and uploads them as one object on shutdown.
struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    key: String,
    state: WriterState,
}

impl ObjectWriter {
    fn new(store: Arc<dyn ObjectStore>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            state: WriterState::Buffering(BytesMut::new()),
        }
    }
}

impl AsyncWrite for ObjectWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().state {
            WriterState::Buffering(buf) => {
                buf.extend_from_slice(data);
                Poll::Ready(Ok(data.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "object writer is closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                WriterState::Buffering(buf) => {
                    let data: Bytes = std::mem::take(buf).freeze();
                    let store = Arc::clone(&this.store);
                    let key = this.key.clone();
                    this.state =
                        WriterState::Uploading(Box::pin(async move { store.put(&key, data).await }));
                }
                WriterState::Uploading(upload) => {
                    let result = futures_util::ready!(upload.as_mut().poll(cx));
                    this.state = WriterState::Closed;
                    return Poll::Ready(result.map_err(io::Error::from));
                }
                WriterState::Closed => return Poll::Ready(Ok(())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::SeekFrom;
    use std::sync::atomic::Ordering;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::io::SeekableRead;
    use crate::storage::testing::MemoryStore;
    use crate::storage::StorageError;

    fn backend(store: &Arc<MemoryStore>, retry_time: Duration) -> ObjectBackend {
        let config = S3Config {
            non_exist_retry_time: retry_time,
            chunk_size: 6 * 1024 * 1024,
            ..Default::default()
        };
        ObjectBackend::new(store.clone(), &config)
    }

    #[tokio::test]
    async fn write_then_read_back_through_backend() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store, Duration::ZERO);

        let mut writer = backend.new_file_writer("dir/file").await.unwrap();
        for _ in 0..1000 {
            writer.write_all(b"this is a test").await.unwrap();
        }
        writer.shutdown().await.unwrap();
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert!(writer.write_all(b"late").await.is_err());

        assert_eq!(backend.get_file_size("dir/file").await.unwrap(), 14_000);

        let mut reader = backend.new_file_reader("dir/file").await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"this is a test".repeat(1000));

        let mut seeker = backend.new_file_read_seeker("dir/file").await.unwrap();
        assert_eq!(seeker.seek(SeekFrom::Start(6302)).await.unwrap(), 6302);
        let mut buf = vec![0u8; 65536];
        assert_eq!(seeker.read(&mut buf).await.unwrap(), 7698);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_never_retried() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store, Duration::from_secs(120));

        let err = backend.get_file_size("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.heads.load(Ordering::SeqCst), 1);

        assert!(backend.new_file_read_seeker("missing").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_within_window() {
        let store = Arc::new(MemoryStore::new().with_object("f", vec![1u8; 10]));
        let backend = backend(&store, Duration::from_secs(120));
        store.fail_next(3);

        assert_eq!(backend.get_file_size("f").await.unwrap(), 10);
        assert_eq!(store.heads.load(Ordering::SeqCst), 4);

        store.fail_next(2);
        let mut reader = backend.new_file_reader("f").await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, vec![1u8; 10]);
    }

    #[tokio::test]
    async fn transient_failure_surfaces_once_window_is_spent() {
        let store = Arc::new(MemoryStore::new().with_object("f", vec![1u8; 10]));
        let backend = backend(&store, Duration::ZERO);
        store.fail_next(1);

        assert!(matches!(
            backend.get_file_size("f").await,
            Err(StorageError::Transient(_))
        ));
        assert_eq!(store.heads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_upload_surfaces_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let backend = backend(&store, Duration::ZERO);
        store.fail_next(1);

        let mut writer = backend.new_file_writer("f").await.unwrap();
        writer.write_all(b"data").await.unwrap();
        assert!(writer.shutdown().await.is_err());
        assert!(backend.get_file_size("f").await.unwrap_err().is_not_found());
    }
}
