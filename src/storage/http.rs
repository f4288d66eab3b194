use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::{header, Client, Response, StatusCode};

use super::object_store::range_header;
use super::{ObjectBody, ObjectStore, S3Config, StorageError, StorageResult};

/// Anonymous client for an S3-compatible endpoint serving a public bucket.
///
/// Objects are addressed path-style as `{endpoint}/{bucket}/{key}`.
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    /// Create a client for `{endpoint}/{bucket}`. Only http(s) endpoints are accepted.
    pub fn new(config: &S3Config) -> StorageResult<Self> {
        let endpoint = config.endpoint.trim_end_matches('/');
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(StorageError::Config(format!(
                "endpoint {:?} is not an http(s) URL",
                config.endpoint
            )));
        }
        if config.bucket.is_empty() {
            return Err(StorageError::Config("bucket name is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("{}/{}", endpoint, config.bucket),
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

fn request_error(key: &str, e: reqwest::Error) -> StorageError {
    StorageError::Transient(format!("{}: {}", key, e))
}

/// Map a non-success status to the storage error taxonomy.
fn check_status(key: &str, resp: &Response) -> StorageResult<()> {
    match resp.status() {
        status if status.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
        status => Err(StorageError::Transient(format!(
            "{}: request failed with status {}",
            key, status
        ))),
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn head(&self, key: &str) -> StorageResult<u64> {
        let resp = self
            .client
            .head(self.url(key))
            .send()
            .await
            .map_err(|e| request_error(key, e))?;
        check_status(key, &resp)?;

        resp.headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StorageError::Transient(format!("{}: no Content-Length", key)))
    }

    async fn get(&self, key: &str, range: Option<Range<u64>>) -> StorageResult<ObjectBody> {
        let mut request = self.client.get(self.url(key));
        if let Some(range) = &range {
            request = request.header(header::RANGE, range_header(range));
        }

        let resp = request.send().await.map_err(|e| request_error(key, e))?;
        check_status(key, &resp)?;

        if range.is_some() && resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(StorageError::Transient(format!(
                "{}: range request answered with status {}",
                key,
                resp.status()
            )));
        }

        let content_range = resp
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let stream = resp.bytes_stream().map_err(std::io::Error::other);

        Ok(ObjectBody {
            content_range,
            stream: Box::pin(stream),
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let resp = self
            .client
            .put(self.url(key))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| request_error(key, e))?;
        check_status(key, &resp)
    }

    async fn probe(&self) -> StorageResult<()> {
        let resp = self
            .client
            .head(&self.base_url)
            .send()
            .await
            .map_err(|e| request_error(&self.base_url, e))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(StorageError::Config(format!(
                "bucket at {} does not exist",
                self.base_url
            ))),
            _ => Ok(()),
        }
    }
}
