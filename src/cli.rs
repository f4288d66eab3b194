use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::storage::{
    BackendKind, PosixConfig, S3Config, StorageConfig, DEFAULT_CHUNK_SIZE,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Posix,
    S3,
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "sda-fetch")]
#[command(version)]
#[command(about = "Read byte ranges of archived files from local or S3 storage", long_about = None)]
#[command(after_help = "Examples:\n  \
  sda-fetch --location /archive dataset/file.c4gh > file.c4gh\n  \
  sda-fetch --backend s3 --endpoint https://s3:9000 --bucket archive --offset 6302 file.c4gh\n  \
  sda-fetch --backend s3 --bucket archive --header new.hdr --offset 124 body.c4gh")]
pub struct Cli {
    /// Path of the file inside the storage location
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Storage backend
    #[arg(long, value_enum, default_value = "posix", env = "STORAGE_TYPE")]
    pub backend: BackendArg,

    /// Directory of the posix backend
    #[arg(long, value_name = "DIR", default_value = ".", env = "STORAGE_LOCATION")]
    pub location: PathBuf,

    /// S3 endpoint URL
    #[arg(long, default_value = "", env = "S3_URL")]
    pub endpoint: String,

    /// S3 region
    #[arg(long, default_value = "us-east-1", env = "S3_REGION")]
    pub region: String,

    /// S3 bucket
    #[arg(long, default_value = "", env = "S3_BUCKET")]
    pub bucket: String,

    #[arg(long, default_value = "", env = "S3_ACCESS_KEY", hide_env_values = true)]
    pub access_key: String,

    #[arg(long, default_value = "", env = "S3_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Range fetch size in bytes (values below 5 MiB fall back to 50 MiB)
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "S3_CHUNK_SIZE")]
    pub chunk_size: u64,

    /// Seconds to keep retrying transient failures of size lookups and downloads
    #[arg(long, value_name = "SECS", default_value_t = 120, env = "S3_NON_EXIST_RETRY_TIME")]
    pub retry_secs: u64,

    /// Prepend this local file (e.g. a re-encrypted header) to the object
    #[arg(long, value_name = "FILE")]
    pub header: Option<PathBuf>,

    /// Start reading at this offset
    #[arg(long, default_value_t = 0)]
    pub offset: i64,

    /// Interpret --offset relative to the end of the stream
    #[arg(long)]
    pub from_end: bool,

    /// Copy at most this many bytes
    #[arg(long)]
    pub length: Option<u64>,

    /// Only print the size of the file
    #[arg(long)]
    pub size: bool,

    /// Quiet mode
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    /// Backend configuration described by the arguments.
    pub fn storage_config(&self) -> StorageConfig {
        let kind = match self.backend {
            BackendArg::Posix => BackendKind::Posix,
            BackendArg::S3 => BackendKind::S3,
            BackendArg::Http => BackendKind::Http,
        };

        StorageConfig {
            kind,
            posix: PosixConfig {
                location: self.location.clone(),
            },
            s3: S3Config {
                endpoint: self.endpoint.clone(),
                region: self.region.clone(),
                bucket: self.bucket.clone(),
                access_key: self.access_key.clone(),
                secret_key: self.secret_key.clone(),
                chunk_size: self.chunk_size,
                non_exist_retry_time: Duration::from_secs(self.retry_secs),
            },
        }
    }

    /// Whether the caller asked for anything other than the whole stream from the start.
    pub fn is_ranged(&self) -> bool {
        self.offset != 0 || self.from_end || self.length.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_s3_config_from_args() {
        let cli = Cli::parse_from([
            "sda-fetch",
            "--backend",
            "s3",
            "--endpoint",
            "http://localhost:9000",
            "--bucket",
            "archive",
            "--chunk-size",
            "1024",
            "--retry-secs",
            "5",
            "file.c4gh",
        ]);

        let config = cli.storage_config();
        assert_eq!(config.kind, BackendKind::S3);
        assert_eq!(config.s3.bucket, "archive");
        assert_eq!(config.s3.chunk_size, 1024);
        assert_eq!(config.s3.non_exist_retry_time, Duration::from_secs(5));
        assert!(!cli.is_ranged());
    }

    #[test]
    fn negative_offset_from_end_is_ranged() {
        let cli = Cli::parse_from(["sda-fetch", "--from-end", "--offset=-5", "file"]);
        assert!(cli.is_ranged());
        assert_eq!(cli.offset, -5);
    }
}
