use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::debug;

use super::source::RemoteSource;
use crate::error::ExtractionError;
use crate::readers::ByteRange;

/// Retrieves a set of byte ranges of one remote file and concatenates them
/// in ascending offset order. Any failed range fails the whole fetch; no
/// retries happen here.
pub struct RangeFetcher {
    source: Arc<dyn RemoteSource>,
}

impl RangeFetcher {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(
        &self,
        url: &str,
        ranges: &[ByteRange],
    ) -> std::result::Result<Bytes, ExtractionError> {
        let mut ordered = ranges.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut buffer = BytesMut::new();
        for range in &ordered {
            let chunk = self.source.get_range(url, *range).await.map_err(|e| {
                ExtractionError::RangeFetchFailure {
                    url: url.to_string(),
                    range: range.to_string(),
                    reason: e.to_string(),
                }
            })?;
            buffer.extend_from_slice(&chunk);
        }

        debug!(url = %url, ranges = ordered.len(), bytes = buffer.len(), "Fetched byte ranges");
        Ok(buffer.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemorySource;

    const URL: &str = "https://example.com/file.grib2";

    #[tokio::test]
    async fn test_concatenates_in_offset_order() {
        let source = Arc::new(MemorySource::new().with_file(URL, "AAAABBBBCCCC"));
        let fetcher = RangeFetcher::new(source.clone());

        let ranges = [ByteRange::new(8, None), ByteRange::new(0, Some(3))];
        let body = fetcher.fetch(URL, &ranges).await.unwrap();

        assert_eq!(&body[..], b"AAAACCCC");
        assert_eq!(source.range_requests(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_ranges_fetched_once() {
        let source = Arc::new(MemorySource::new().with_file(URL, "AAAABBBB"));
        let fetcher = RangeFetcher::new(source.clone());

        let ranges = [ByteRange::new(4, None), ByteRange::new(4, None)];
        let body = fetcher.fetch(URL, &ranges).await.unwrap();

        assert_eq!(&body[..], b"BBBB");
        assert_eq!(source.range_requests(), 1);
    }

    #[tokio::test]
    async fn test_any_failed_range_fails_fetch() {
        let fetcher = RangeFetcher::new(Arc::new(MemorySource::new().with_file(URL, "AAAA")));

        let ranges = [ByteRange::new(0, Some(1)), ByteRange::new(10, None)];
        let err = fetcher.fetch(URL, &ranges).await.unwrap_err();

        match err {
            ExtractionError::RangeFetchFailure { range, reason, .. } => {
                assert_eq!(range, "10-");
                assert!(reason.contains("416"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
