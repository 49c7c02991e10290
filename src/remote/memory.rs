use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::source::{slice_full_body, RemoteSource};
use crate::error::{ArchiverError, Result};
use crate::readers::ByteRange;

/// A [`RemoteSource`] over files held in memory, for offline replays and
/// tests. Unknown URLs answer 404.
#[derive(Default)]
pub struct MemorySource {
    files: HashMap<String, Bytes>,
    broken: HashSet<String>,
    range_requests: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.files.insert(url.into(), body.into());
        self
    }

    /// Range requests against `url` answer 500.
    pub fn with_broken_ranges(mut self, url: impl Into<String>) -> Self {
        self.broken.insert(url.into());
        self
    }

    pub fn range_requests(&self) -> usize {
        self.range_requests.load(Ordering::Relaxed)
    }

    fn lookup(&self, url: &str) -> Result<&Bytes> {
        self.files.get(url).ok_or_else(|| ArchiverError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn get_text(&self, url: &str) -> Result<String> {
        let body = self.lookup(url)?;
        Ok(String::from_utf8_lossy(body).into_owned())
    }

    async fn get_range(&self, url: &str, range: ByteRange) -> Result<Bytes> {
        self.range_requests.fetch_add(1, Ordering::Relaxed);

        if self.broken.contains(url) {
            return Err(ArchiverError::HttpStatus {
                url: url.to_string(),
                status: 500,
            });
        }

        let body = self.lookup(url)?;
        if range.start >= body.len() as u64 {
            return Err(ArchiverError::HttpStatus {
                url: url.to_string(),
                status: 416,
            });
        }
        Ok(slice_full_body(body.clone(), range))
    }

    async fn content_length(&self, url: &str) -> Result<Option<u64>> {
        Ok(self.files.get(url).map(|b| b.len() as u64))
    }
}
