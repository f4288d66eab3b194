//! Main entry point for the sda-fetch CLI application.
//!
//! Streams a stored file, or a byte range of it, to stdout. With `--header`
//! a local file is spliced in front of the stored body the same way the
//! download service prepends a re-encrypted crypt4gh header.

use std::io::SeekFrom;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sda_storage::{
    copy_to, Backend, Cli, MemoryReader, SeekableMultiReader, SeekableRead, StorageBackend,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sda_storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let backend = Backend::new(&cli.storage_config())
        .await
        .context("failed to set up storage backend")?;

    if cli.size {
        let mut size = backend.get_file_size(&cli.path).await?;
        if let Some(header) = &cli.header {
            size += tokio::fs::metadata(header).await?.len();
        }
        println!("{}", size);
        return Ok(());
    }

    let started = Instant::now();
    let copied = if cli.header.is_none() && !cli.is_ranged() {
        // Whole file without a substituted header: the plain reader is enough.
        let mut reader = backend.new_file_reader(&cli.path).await?;
        tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?
    } else {
        let mut stream = open_stream(&backend, &cli).await?;
        let pos = if cli.from_end {
            SeekFrom::End(cli.offset)
        } else if cli.offset < 0 {
            bail!("--offset must not be negative unless --from-end is given");
        } else {
            SeekFrom::Start(cli.offset as u64)
        };
        stream.seek(pos).await?;

        let copied = copy_to(stream.as_mut(), cli.length, &mut tokio::io::stdout()).await?;
        stream.close().await?;
        copied
    };

    if !cli.quiet {
        eprintln!(
            "\nCopied {} in {:.2?}",
            format_size(copied),
            started.elapsed()
        );
    }

    Ok(())
}

/// Open the seekable stream for `cli.path`, prefixed with `--header` if given.
async fn open_stream(backend: &Backend, cli: &Cli) -> Result<Box<dyn SeekableRead>> {
    let body = backend.new_file_read_seeker(&cli.path).await?;

    let Some(header) = &cli.header else {
        return Ok(body);
    };

    let header = tokio::fs::read(header)
        .await
        .with_context(|| format!("failed to read header {}", header.display()))?;
    let parts: Vec<Box<dyn SeekableRead>> = vec![Box::new(MemoryReader::new(header)), body];

    Ok(Box::new(SeekableMultiReader::new(parts).await?))
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
