//! Seekable reader over one remote object.
//!
//! A freshly opened reader is in sequential mode: the first read opens one
//! unranged GET and later reads forward bytes from it, which is the cheapest
//! way to stream a whole object once. The first successful seek switches the
//! reader, irreversibly, to random-access mode where reads are served from a
//! block cache filled by range fetches. Every random-access read or seek
//! kicks a background prefetch for the new position so the next read
//! usually finds its bytes already cached.
//!
//! Cache state is shared with the background tasks behind one mutex that is
//! never held across a network call. A foreground read that finds its offset
//! inside an in-flight prefetch window reports [`ReadStatus::Pending`]
//! instead of waiting on the lock or fetching the same bytes twice.

use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::io::StreamReader;

use super::object_store::check_content_range;
use super::{BodyStream, ObjectStore, StorageError, StorageResult};
use crate::io::{absolute_offset, ReadStatus, SeekableRead};

/// Smallest configured chunk size honoured for range fetches.
pub const MIN_PREFETCH_SIZE: u64 = 5 * 1024 * 1024;
/// Range fetch size used when the configured chunk size is below the floor.
pub const DEFAULT_PREFETCH_SIZE: u64 = 50 * 1024 * 1024;

/// Block count at which a prefetch prunes the cache.
const PRUNE_THRESHOLD: usize = 16;
/// Most recently appended blocks kept by a prune.
const PRUNE_KEEP: usize = 8;
/// Background fetches allowed in flight per reader.
const MAX_PREFETCHES: usize = 4;

type ObjectStream = StreamReader<BodyStream, Bytes>;

/// Range fetch size for a configured chunk size.
pub fn prefetch_size(chunk_size: u64) -> u64 {
    if chunk_size >= MIN_PREFETCH_SIZE {
        chunk_size
    } else {
        DEFAULT_PREFETCH_SIZE
    }
}

/// Contiguous object bytes obtained from one range fetch.
#[derive(Debug)]
struct CacheBlock {
    start: u64,
    data: Bytes,
}

impl CacheBlock {
    fn covers(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.start + self.data.len() as u64
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Blocks in append order. Overlaps are tolerated, lookups take the first hit.
    blocks: Vec<CacheBlock>,
    /// Start offsets of range fetches currently in flight.
    outstanding: Vec<u64>,
}

impl CacheState {
    /// Drop all but the newest blocks once the threshold is reached.
    fn prune(&mut self) -> bool {
        if self.blocks.len() < PRUNE_THRESHOLD {
            return false;
        }
        let keep_from = self.blocks.len() - PRUNE_KEEP;
        self.blocks.drain(..keep_from);
        true
    }

    fn is_cached(&self, offset: u64) -> bool {
        self.blocks.iter().any(|b| b.covers(offset))
    }

    /// Copy bytes at `offset` from the first covering block.
    fn copy_at(&self, offset: u64, dst: &mut [u8]) -> Option<usize> {
        let block = self.blocks.iter().find(|b| b.covers(offset))?;
        let available = &block.data[(offset - block.start) as usize..];
        let n = dst.len().min(available.len());
        dst[..n].copy_from_slice(&available[..n]);
        Some(n)
    }

    fn is_outstanding(&self, offset: u64, window: u64) -> bool {
        self.outstanding
            .iter()
            .any(|&start| offset >= start && offset < start.saturating_add(window))
    }

    fn remove_outstanding(&mut self, offset: u64) {
        if let Some(at) = self.outstanding.iter().position(|&start| start == offset) {
            self.outstanding.swap_remove(at);
        }
    }
}

/// Entry in `outstanding` for one in-flight fetch.
///
/// Removed again by [`OutstandingFetch::release`] or, if the fetching future
/// is dropped mid-request, on drop.
struct OutstandingFetch<'a> {
    cache: &'a BlockCache,
    offset: u64,
    armed: bool,
}

impl<'a> OutstandingFetch<'a> {
    fn register(cache: &'a BlockCache, state: &mut CacheState, offset: u64) -> Self {
        state.outstanding.push(offset);
        Self {
            cache,
            offset,
            armed: true,
        }
    }

    /// Remove the entry while the caller already holds the cache lock.
    fn release(mut self, state: &mut CacheState) {
        state.remove_outstanding(self.offset);
        self.armed = false;
    }
}

impl Drop for OutstandingFetch<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.lock().remove_outstanding(self.offset);
        }
    }
}

/// Block cache of a reader in random-access mode, shared with its prefetch tasks.
struct BlockCache {
    store: Arc<dyn ObjectStore>,
    key: String,
    object_size: u64,
    prefetch_size: u64,
    state: Mutex<CacheState>,
    prefetch_slots: Arc<Semaphore>,
}

impl BlockCache {
    fn new(store: Arc<dyn ObjectStore>, key: String, object_size: u64, prefetch_size: u64) -> Self {
        Self {
            store,
            key,
            object_size,
            prefetch_size,
            state: Mutex::new(CacheState::default()),
            prefetch_slots: Arc::new(Semaphore::new(MAX_PREFETCHES)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Blocks are append-only, so state left by a panicking holder is still valid.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Range GET of one prefetch window starting at `offset`.
    async fn fetch_range(&self, offset: u64) -> StorageResult<Bytes> {
        let end = offset.saturating_add(self.prefetch_size).min(self.object_size);
        let body = self.store.get(&self.key, Some(offset..end)).await?;
        check_content_range(body.content_range.as_deref(), offset)?;

        let data = body.collect().await?;
        if data.is_empty() {
            return Err(StorageError::Transient(format!(
                "empty range response for {} at {}",
                self.key, offset
            )));
        }
        Ok(data)
    }

    /// Fire-and-forget prefetch of the window at `offset`.
    fn spawn_prefetch(self: &Arc<Self>, offset: u64) {
        if offset >= self.object_size {
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.prefetch_at(offset).await });
    }

    /// Best-effort fetch of the window at `offset` into the cache. Failures are dropped.
    async fn prefetch_at(&self, offset: u64) {
        let (_permit, registration) = {
            let mut state = self.lock();
            if state.prune() {
                tracing::debug!("pruned cache of {} to {} blocks", self.key, state.blocks.len());
            }
            if state.is_cached(offset) || state.is_outstanding(offset, self.prefetch_size) {
                return;
            }
            let Ok(permit) = Arc::clone(&self.prefetch_slots).try_acquire_owned() else {
                tracing::debug!("prefetch slots busy, skipping {} at {}", self.key, offset);
                return;
            };
            (permit, OutstandingFetch::register(self, &mut state, offset))
        };

        let fetched = self.fetch_range(offset).await;

        let mut state = self.lock();
        registration.release(&mut state);
        match fetched {
            Ok(data) if state.blocks.len() < PRUNE_THRESHOLD => {
                state.blocks.push(CacheBlock { start: offset, data });
            }
            Ok(_) => tracing::debug!("cache of {} full, dropping prefetch at {}", self.key, offset),
            Err(e) => tracing::debug!("prefetch of {} at {} failed: {}", self.key, offset, e),
        }
    }
}

enum Mode {
    /// No seek yet; reads forward one whole-object stream, opened lazily.
    Sequential { stream: Option<ObjectStream> },
    /// Entered on the first seek and never left.
    RandomAccess { cache: Arc<BlockCache> },
}

/// Seekable reader over one object in an [`ObjectStore`].
///
/// The object size is fixed when the reader is created. Dropping the reader
/// abandons its cache; prefetches still in flight run to completion and
/// their results are discarded with the last reference.
pub struct SeekableObjectReader {
    store: Arc<dyn ObjectStore>,
    key: String,
    object_size: u64,
    prefetch_size: u64,
    current_offset: u64,
    mode: Mode,
}

impl SeekableObjectReader {
    /// Create a reader in sequential mode for an object of `object_size` bytes.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        key: impl Into<String>,
        object_size: u64,
        chunk_size: u64,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            object_size,
            prefetch_size: prefetch_size(chunk_size),
            current_offset: 0,
            mode: Mode::Sequential { stream: None },
        }
    }

    /// Object size fixed at creation.
    pub fn size(&self) -> u64 {
        self.object_size
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.current_offset
    }

    /// Whether a seek has switched the reader to the block cache.
    pub fn is_random_access(&self) -> bool {
        matches!(self.mode, Mode::RandomAccess { .. })
    }

    /// Switch to random-access mode if needed and return the block cache.
    fn random_access(&mut self) -> Arc<BlockCache> {
        if let Mode::RandomAccess { cache } = &self.mode {
            return Arc::clone(cache);
        }

        let cache = Arc::new(BlockCache::new(
            Arc::clone(&self.store),
            self.key.clone(),
            self.object_size,
            self.prefetch_size,
        ));
        self.mode = Mode::RandomAccess {
            cache: Arc::clone(&cache),
        };
        cache
    }

    async fn read_cached(
        &mut self,
        cache: &Arc<BlockCache>,
        dst: &mut [u8],
    ) -> StorageResult<ReadStatus> {
        let offset = self.current_offset;
        if offset >= self.object_size {
            return Ok(ReadStatus::Eof);
        }
        if dst.is_empty() {
            return Ok(ReadStatus::Filled(0));
        }

        let registration = {
            let mut state = cache.lock();
            if let Some(n) = state.copy_at(offset, dst) {
                drop(state);
                self.current_offset += n as u64;
                cache.spawn_prefetch(self.current_offset);
                return Ok(ReadStatus::Filled(n));
            }
            if state.is_outstanding(offset, cache.prefetch_size) {
                return Ok(ReadStatus::Pending);
            }
            OutstandingFetch::register(cache, &mut state, offset)
        };

        let fetched = cache.fetch_range(offset).await;

        let n = {
            let mut state = cache.lock();
            registration.release(&mut state);
            let data = fetched?;

            tracing::info!(
                "stored {} bytes of {} into cache at {}",
                data.len(),
                self.key,
                offset
            );
            let n = dst.len().min(data.len());
            dst[..n].copy_from_slice(&data[..n]);
            state.blocks.push(CacheBlock { start: offset, data });
            n
        };

        self.current_offset += n as u64;
        cache.spawn_prefetch(self.current_offset);
        Ok(ReadStatus::Filled(n))
    }
}

#[async_trait]
impl SeekableRead for SeekableObjectReader {
    async fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64> {
        let target = absolute_offset(pos, self.current_offset, self.object_size).ok_or_else(|| {
            StorageError::InvalidSeek(format!(
                "{:?} from {} would be before start of {}",
                pos, self.current_offset, self.key
            ))
        })?;

        if target > self.object_size {
            return Err(StorageError::InvalidSeek(format!(
                "{:?} from {} is beyond end of {} (size {})",
                pos, self.current_offset, self.key, self.object_size
            )));
        }

        let cache = self.random_access();
        self.current_offset = target;
        cache.spawn_prefetch(target);

        Ok(target)
    }

    async fn read_some(&mut self, dst: &mut [u8]) -> StorageResult<ReadStatus> {
        let n = match &mut self.mode {
            Mode::RandomAccess { cache } => {
                let cache = Arc::clone(cache);
                return self.read_cached(&cache, dst).await;
            }
            Mode::Sequential { stream } => {
                if dst.is_empty() {
                    return Ok(ReadStatus::Filled(0));
                }
                if stream.is_none() {
                    let body = self.store.get(&self.key, None).await?;
                    *stream = Some(StreamReader::new(body.stream));
                }
                match stream {
                    Some(reader) => reader.read(dst).await?,
                    None => 0,
                }
            }
        };

        // Tracked so that a later relative seek lands where the caller expects.
        self.current_offset += n as u64;

        if n == 0 {
            Ok(ReadStatus::Eof)
        } else {
            Ok(ReadStatus::Filled(n))
        }
    }
}
