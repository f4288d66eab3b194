use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};

use super::{
    FileReadSeeker, FileReader, FileWriter, PosixConfig, StorageBackend, StorageError,
    StorageResult,
};

/// Backend storing files below a local directory.
#[derive(Debug, Clone)]
pub struct PosixBackend {
    location: PathBuf,
}

impl PosixBackend {
    /// Open the backend, failing if the location is not an existing directory.
    pub fn new(config: &PosixConfig) -> StorageResult<Self> {
        let metadata = std::fs::metadata(&config.location).map_err(|e| {
            StorageError::Config(format!("{}: {}", config.location.display(), e))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "{} is not a directory",
                config.location.display()
            )));
        }

        Ok(Self {
            location: config.location.clone(),
        })
    }

    /// Resolve `path` below the backend directory, ignoring root and parent components.
    fn full_path(&self, path: &str) -> PathBuf {
        let relative: PathBuf = Path::new(path)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.location.join(relative)
    }

    async fn open(&self, path: &str) -> StorageResult<File> {
        let full = self.full_path(path);
        File::open(&full).await.map_err(|e| {
            tracing::error!("failed to open {}: {}", full.display(), e);
            StorageError::from(e)
        })
    }
}

#[async_trait]
impl StorageBackend for PosixBackend {
    async fn get_file_size(&self, path: &str) -> StorageResult<u64> {
        let full = self.full_path(path);
        let metadata = fs::metadata(&full).await.map_err(|e| {
            tracing::error!("failed to stat {}: {}", full.display(), e);
            StorageError::from(e)
        })?;
        Ok(metadata.len())
    }

    async fn new_file_reader(&self, path: &str) -> StorageResult<FileReader> {
        Ok(Box::new(self.open(path).await?))
    }

    async fn new_file_writer(&self, path: &str) -> StorageResult<FileWriter> {
        let full = self.full_path(path);

        let mut options = OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        options.mode(0o640);

        let file = options.open(&full).await.map_err(|e| {
            tracing::error!("failed to create {}: {}", full.display(), e);
            StorageError::from(e)
        })?;
        Ok(Box::new(file))
    }

    async fn new_file_read_seeker(&self, path: &str) -> StorageResult<FileReadSeeker> {
        Ok(Box::new(self.open(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::SeekFrom;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::io::SeekableRead;

    fn backend(dir: &tempfile::TempDir) -> PosixBackend {
        PosixBackend::new(&PosixConfig {
            location: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    #[test]
    fn rejects_plain_file_as_location() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = PosixBackend::new(&PosixConfig {
            location: file.path().to_path_buf(),
        });
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir);

        let mut writer = backend.new_file_writer("data.c4gh").await.unwrap();
        for _ in 0..1000 {
            writer.write_all(b"this is a test").await.unwrap();
        }
        writer.shutdown().await.unwrap();

        assert_eq!(backend.get_file_size("data.c4gh").await.unwrap(), 14_000);

        let mut reader = backend.new_file_reader("data.c4gh").await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content.len(), 14_000);
        assert_eq!(&content[..14], b"this is a test");
    }

    #[tokio::test]
    async fn read_seeker_supports_random_access() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir);
        std::fs::write(dir.path().join("f"), b"0123456789").unwrap();

        let mut seeker = backend.new_file_read_seeker("f").await.unwrap();
        assert_eq!(seeker.seek(SeekFrom::End(-3)).await.unwrap(), 7);

        let mut buf = [0u8; 8];
        let n = seeker.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"789");
        assert_eq!(seeker.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir);

        assert!(backend.get_file_size("nope").await.unwrap_err().is_not_found());
        assert!(backend.new_file_reader("nope").await.is_err());
    }

    #[test]
    fn paths_stay_inside_location() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir);

        assert_eq!(
            backend.full_path("/../etc/passwd"),
            dir.path().join("etc/passwd")
        );
    }
}
