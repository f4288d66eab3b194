mod local;
mod memory;
mod multi;

pub use memory::MemoryReader;
pub use multi::SeekableMultiReader;

use std::io::SeekFrom;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::storage::StorageResult;

/// How long [`SeekableRead::read`] waits before retrying a [`ReadStatus::Pending`] read.
pub const PENDING_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Outcome of a single read against a seekable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were copied into the buffer.
    Filled(usize),
    /// The wanted bytes are already being fetched; call again shortly.
    Pending,
    /// The position is at or past the end of the data.
    Eof,
}

/// A byte source supporting random access through seek and read.
#[async_trait]
pub trait SeekableRead: Send {
    /// Move the read position, returning the new absolute offset.
    async fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64>;

    /// Perform one read at the current position.
    async fn read_some(&mut self, buf: &mut [u8]) -> StorageResult<ReadStatus>;

    /// Read into `buf`, waiting out pending fetches. `Ok(0)` means end of data.
    async fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        loop {
            match self.read_some(buf).await? {
                ReadStatus::Filled(n) => return Ok(n),
                ReadStatus::Eof => return Ok(0),
                ReadStatus::Pending => tokio::time::sleep(PENDING_RETRY_DELAY).await,
            }
        }
    }

    async fn close(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

/// Copy from the current position of `reader` into `out`, stopping after
/// `limit` bytes when given. Returns the number of bytes copied.
pub async fn copy_to<W>(
    reader: &mut dyn SeekableRead,
    limit: Option<u64>,
    out: &mut W,
) -> StorageResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut copied = 0u64;

    loop {
        let want = match limit {
            Some(limit) if copied >= limit => break,
            Some(limit) => buf.len().min((limit - copied) as usize),
            None => buf.len(),
        };

        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }

        out.write_all(&buf[..n]).await?;
        copied += n as u64;
    }

    out.flush().await?;
    Ok(copied)
}

/// Resolve `pos` against `current` and `end`, returning `None` when the target is negative.
pub(crate) fn absolute_offset(pos: SeekFrom, current: u64, end: u64) -> Option<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => return Some(offset),
        SeekFrom::Current(delta) => current as i128 + delta as i128,
        SeekFrom::End(delta) => end as i128 + delta as i128,
    };

    u64::try_from(target).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_offset_rejects_negative_targets() {
        assert_eq!(absolute_offset(SeekFrom::Start(7), 3, 10), Some(7));
        assert_eq!(absolute_offset(SeekFrom::Current(-3), 3, 10), Some(0));
        assert_eq!(absolute_offset(SeekFrom::Current(-4), 3, 10), None);
        assert_eq!(absolute_offset(SeekFrom::End(-10), 3, 10), Some(0));
        assert_eq!(absolute_offset(SeekFrom::End(-11), 3, 10), None);
    }

    #[tokio::test]
    async fn copy_to_honours_limit() {
        let mut reader = MemoryReader::new(b"0123456789".to_vec());
        reader.seek(SeekFrom::Start(2)).await.unwrap();

        let mut out = Vec::new();
        let copied = copy_to(&mut reader, Some(5), &mut out).await.unwrap();

        assert_eq!(copied, 5);
        assert_eq!(out, b"23456");
    }

    #[tokio::test]
    async fn copy_to_without_limit_drains_reader() {
        let mut reader = MemoryReader::new(b"abc".to_vec());

        let mut out = Vec::new();
        let copied = copy_to(&mut reader, None, &mut out).await.unwrap();

        assert_eq!(copied, 3);
        assert_eq!(out, b"abc");
    }
}
