//! In-memory object store used by the storage tests.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use super::{ObjectBody, ObjectStore, StorageError, StorageResult};

/// Object store double that counts calls and can inject latency and failures.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
    latency: Duration,
    /// Size of the chunks a whole-object GET streams back.
    stream_chunk: usize,
    fail_next: AtomicUsize,
    skew_content_range: bool,
    pub heads: AtomicUsize,
    pub full_gets: AtomicUsize,
    pub range_gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            stream_chunk: 1000,
            ..Default::default()
        }
    }

    pub fn with_object(self, key: &str, data: impl Into<Bytes>) -> Self {
        self.insert(key, data);
        self
    }

    /// Delay every GET by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer ranged GETs with a `Content-Range` one byte off.
    pub fn with_skewed_content_range(mut self) -> Self {
        self.skew_content_range = true;
        self
    }

    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.lock().insert(key.to_string(), data.into());
    }

    /// Fail the next `n` calls with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn range_gets(&self) -> usize {
        self.range_gets.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected_failure(&self) -> StorageResult<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Transient("injected failure".into()));
        }
        Ok(())
    }

    fn object(&self, key: &str) -> StorageResult<Bytes> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &str) -> StorageResult<u64> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        Ok(self.object(key)?.len() as u64)
    }

    async fn get(&self, key: &str, range: Option<Range<u64>>) -> StorageResult<ObjectBody> {
        match range {
            Some(_) => self.range_gets.fetch_add(1, Ordering::SeqCst),
            None => self.full_gets.fetch_add(1, Ordering::SeqCst),
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.injected_failure()?;
        let data = self.object(key)?;
        let size = data.len() as u64;

        match range {
            Some(range) => {
                if range.start >= size {
                    return Err(StorageError::Transient(format!(
                        "416 range {}.. not satisfiable for {} bytes",
                        range.start, size
                    )));
                }
                let end = range.end.min(size);
                let start = if self.skew_content_range {
                    range.start + 1
                } else {
                    range.start
                };
                let body = data.slice(range.start as usize..end as usize);
                Ok(ObjectBody {
                    content_range: Some(format!("bytes {}-{}/{}", start, end - 1, size)),
                    stream: Box::pin(stream::iter(vec![Ok(body)])),
                })
            }
            None => {
                let chunk = self.stream_chunk.max(1);
                let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
                    .step_by(chunk)
                    .map(|at| Ok(data.slice(at..(at + chunk).min(data.len()))))
                    .collect();
                Ok(ObjectBody {
                    content_range: None,
                    stream: Box::pin(stream::iter(chunks)),
                })
            }
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        self.insert(key, data);
        Ok(())
    }
}
