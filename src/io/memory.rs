use std::io::SeekFrom;

use async_trait::async_trait;
use bytes::Bytes;

use super::{absolute_offset, ReadStatus, SeekableRead};
use crate::storage::{StorageError, StorageResult};

/// Seekable reader over an in-memory buffer, such as a re-encrypted header.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    data: Bytes,
    pos: u64,
}

impl MemoryReader {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    /// Length of the buffer in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl SeekableRead for MemoryReader {
    async fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64> {
        let target = absolute_offset(pos, self.pos, self.len()).ok_or_else(|| {
            StorageError::InvalidSeek(format!("{:?} from {} would be before start", pos, self.pos))
        })?;

        self.pos = target;
        Ok(target)
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> StorageResult<ReadStatus> {
        if self.pos >= self.len() {
            return Ok(ReadStatus::Eof);
        }

        let remaining = &self.data[self.pos as usize..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n as u64;

        Ok(ReadStatus::Filled(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeks_like_a_cursor() {
        let mut reader = MemoryReader::new(b"crypt4gh header".to_vec());
        assert_eq!(reader.len(), 15);

        assert_eq!(reader.seek(SeekFrom::End(-6)).await.unwrap(), 9);
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"header");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);

        assert_eq!(reader.seek(SeekFrom::Start(100)).await.unwrap(), 100);
        assert_eq!(reader.read_some(&mut buf).await.unwrap(), ReadStatus::Eof);
    }

    #[tokio::test]
    async fn rejects_seek_before_start() {
        let mut reader = MemoryReader::new(b"abc".to_vec());
        reader.seek(SeekFrom::Start(2)).await.unwrap();

        let err = reader.seek(SeekFrom::Current(-3)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidSeek(_)));
        assert_eq!(reader.seek(SeekFrom::Current(0)).await.unwrap(), 2);
    }
}
