use std::io::SeekFrom;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ReadStatus, SeekableRead};
use crate::storage::StorageResult;

/// Local files seek and read directly through the file handle.
#[async_trait]
impl SeekableRead for File {
    async fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64> {
        Ok(AsyncSeekExt::seek(self, pos).await?)
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> StorageResult<ReadStatus> {
        if buf.is_empty() {
            return Ok(ReadStatus::Filled(0));
        }

        match AsyncReadExt::read(self, buf).await? {
            0 => Ok(ReadStatus::Eof),
            n => Ok(ReadStatus::Filled(n)),
        }
    }
}
