use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default chunk size used for range fetches, 50 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// How long metadata and plain-reader calls retry transient failures.
pub const DEFAULT_NON_EXIST_RETRY_TIME: Duration = Duration::from_secs(120);

/// Which backend a [`StorageConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Posix,
    /// Authenticated S3-compatible store.
    S3,
    /// Anonymous S3-compatible endpoint reached over plain HTTP(S).
    Http,
}

/// Storage configuration, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub kind: BackendKind,
    pub posix: PosixConfig,
    pub s3: S3Config,
}

#[derive(Debug, Clone, Default)]
pub struct PosixConfig {
    /// Directory that object paths are resolved against.
    pub location: PathBuf,
}

#[derive(Clone)]
pub struct S3Config {
    /// Endpoint URL including scheme and port, e.g. `https://s3.example.org:9000`.
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Requested range-fetch size in bytes.
    pub chunk_size: u64,
    pub non_exist_retry_time: Duration,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            non_exist_retry_time: DEFAULT_NON_EXIST_RETRY_TIME,
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("chunk_size", &self.chunk_size)
            .field("non_exist_retry_time", &self.non_exist_retry_time)
            .finish()
    }
}
