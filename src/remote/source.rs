use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::{ArchiverError, Result};
use crate::readers::ByteRange;

/// Read access to remote files. Implemented over HTTP for production and
/// in memory for tests.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch a whole text document (used for sidecar indexes).
    async fn get_text(&self, url: &str) -> Result<String>;

    /// Fetch one inclusive byte range of a file.
    async fn get_range(&self, url: &str, range: ByteRange) -> Result<Bytes>;

    /// Total size of a file, when the source can tell cheaply.
    async fn content_length(&self, _url: &str) -> Result<Option<u64>> {
        Ok(None)
    }
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiverError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    async fn get_range(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .header(header::RANGE, range.header_value())
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => Ok(response.bytes().await?),
            StatusCode::OK => {
                // Server ignored the Range header and sent the whole file
                let body = response.bytes().await?;
                debug!(url = %url, range = %range, size = body.len(), "Range ignored by server");
                Ok(slice_full_body(body, range))
            }
            status => Err(ArchiverError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn content_length(&self, url: &str) -> Result<Option<u64>> {
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        Ok(response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok()))
    }
}

/// Cut a requested range out of a complete file body.
pub fn slice_full_body(body: Bytes, range: ByteRange) -> Bytes {
    let len = body.len() as u64;
    if range.start >= len {
        return Bytes::new();
    }

    let end = match range.end {
        Some(end) => (end + 1).min(len),
        None => len,
    };
    body.slice(range.start as usize..end as usize)
}
