use std::io::SeekFrom;

use async_trait::async_trait;

use super::{absolute_offset, ReadStatus, SeekableRead};
use crate::storage::{StorageError, StorageResult};

/// Presents an ordered list of seekable readers as one contiguous stream.
///
/// Used to splice a freshly re-encrypted crypt4gh header onto an untouched
/// archive body without buffering either. Component sizes are probed once
/// at construction; seeking afterwards is pure arithmetic on the logical
/// offset and components are only positioned when a read needs them.
pub struct SeekableMultiReader {
    readers: Vec<Box<dyn SeekableRead>>,
    sizes: Vec<u64>,
    current_offset: u64,
    total_size: u64,
}

impl SeekableMultiReader {
    /// Build the stream, probing each reader's length with a seek to its end.
    pub async fn new(mut readers: Vec<Box<dyn SeekableRead>>) -> StorageResult<Self> {
        let mut sizes = Vec::with_capacity(readers.len());

        for (index, reader) in readers.iter_mut().enumerate() {
            let size = reader
                .seek(SeekFrom::End(0))
                .await
                .map_err(|source| StorageError::NotSeekable {
                    index,
                    source: Box::new(source),
                })?;
            sizes.push(size);
        }

        let total_size = sizes.iter().sum();

        Ok(Self {
            readers,
            sizes,
            current_offset: 0,
            total_size,
        })
    }

    /// Sum of the component sizes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.current_offset
    }

    /// Index of the component holding `offset` and that component's start.
    fn locate(&self, offset: u64) -> Option<(usize, u64)> {
        let mut start = 0u64;
        for (index, size) in self.sizes.iter().enumerate() {
            if offset < start + size {
                return Some((index, start));
            }
            start += size;
        }
        None
    }
}

#[async_trait]
impl SeekableRead for SeekableMultiReader {
    async fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64> {
        let target = absolute_offset(pos, self.current_offset, self.total_size).ok_or_else(|| {
            StorageError::InvalidSeek(format!(
                "{:?} from {} would be before start",
                pos, self.current_offset
            ))
        })?;

        self.current_offset = target;
        Ok(target)
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> StorageResult<ReadStatus> {
        // Component ends are skipped by `locate`, so an exhausted component
        // never surfaces end-of-data while later ones still hold bytes.
        let Some((index, start)) = self.locate(self.current_offset) else {
            return Ok(ReadStatus::Eof);
        };

        let local = self.current_offset - start;
        let reader = &mut self.readers[index];
        reader.seek(SeekFrom::Start(local)).await?;

        match reader.read_some(buf).await? {
            ReadStatus::Filled(n) => {
                self.current_offset += n as u64;
                Ok(ReadStatus::Filled(n))
            }
            ReadStatus::Pending => Ok(ReadStatus::Pending),
            ReadStatus::Eof => Err(StorageError::UnexpectedEof {
                index,
                offset: local,
            }),
        }
    }

    async fn close(&mut self) -> StorageResult<()> {
        for reader in &mut self.readers {
            reader.close().await?;
        }
        Ok(())
    }
}
