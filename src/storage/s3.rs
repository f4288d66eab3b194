//! S3 object store client.
//!
//! Talks to AWS S3 or any S3-compatible service (MinIO, Ceph, ...) with
//! static credentials and path-style addressing.

use std::ops::Range;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use futures_util::stream;

use super::object_store::range_header;
use super::{ObjectBody, ObjectStore, S3Config, StorageError, StorageResult};

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for `config.bucket` with static credentials.
    pub fn new(config: &S3Config) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("bucket name is empty".to_string()));
        }

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "sda-storage",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

fn transient(key: &str, err: impl std::error::Error) -> StorageError {
    StorageError::Transient(format!("{}: {}", key, DisplayErrorContext(err)))
}

/// Adapt an SDK byte stream to the store body type.
fn body_stream(body: ByteStream) -> super::BodyStream {
    Box::pin(stream::unfold(body, |mut body| async move {
        body.next()
            .await
            .map(|chunk| (chunk.map_err(std::io::Error::other), body))
    }))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> StorageResult<u64> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                e if e.is_not_found() => StorageError::NotFound(key.to_string()),
                e => transient(key, e),
            })?;

        output
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| StorageError::Transient(format!("{}: no content length", key)))
    }

    async fn get(&self, key: &str, range: Option<Range<u64>>) -> StorageResult<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.as_ref().map(range_header))
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                e if e.is_no_such_key() => StorageError::NotFound(key.to_string()),
                e => transient(key, e),
            })?;

        Ok(ObjectBody {
            content_range: output.content_range().map(str::to_owned),
            stream: body_stream(output.body),
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| transient(key, e))?;
        Ok(())
    }

    async fn probe(&self) -> StorageResult<()> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                StorageError::Config(format!(
                    "bucket {} is not reachable: {}",
                    self.bucket,
                    DisplayErrorContext(e)
                ))
            })?;
        Ok(())
    }
}
