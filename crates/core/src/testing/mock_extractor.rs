//! Mock extractor for testing.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::extractor::{
    ExtractedItem, ExtractionRequest, Extractor, ExtractorError, PlaylistSession,
};
use crate::job::PlaylistItem;

/// One scripted playlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEntry {
    /// Written to `<dir>/<index> - <title>.<extension>`.
    Fetched { title: String, extension: String },
    Unavailable { title: String },
    Failed { title: String, reason: String },
}

impl MockEntry {
    pub fn fetched(title: impl Into<String>, extension: impl Into<String>) -> Self {
        Self::Fetched {
            title: title.into(),
            extension: extension.into(),
        }
    }

    pub fn unavailable(title: impl Into<String>) -> Self {
        Self::Unavailable {
            title: title.into(),
        }
    }

    pub fn failed(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            title: title.into(),
            reason: reason.into(),
        }
    }

    fn title(&self) -> &str {
        match self {
            Self::Fetched { title, .. }
            | Self::Unavailable { title }
            | Self::Failed { title, .. } => title,
        }
    }
}

/// Mock implementation of the Extractor trait.
///
/// Provides controllable behavior for testing:
/// - Scripted entries (fetched, unavailable, failed)
/// - Fatal open errors
/// - Delays on open and per item
/// - Out-of-order yields
///
/// Fetched entries create a small file in the request's output directory.
///
/// # Example
///
/// ```rust,ignore
/// use listgrab_core::testing::{MockEntry, MockExtractor};
///
/// let extractor = MockExtractor::new();
/// extractor.set_title("Late Night Mix").await;
/// extractor
///     .set_entries(vec![
///         MockEntry::fetched("First", "webm"),
///         MockEntry::failed("Second", "HTTP Error 403: Forbidden"),
///     ])
///     .await;
/// ```
#[derive(Debug)]
pub struct MockExtractor {
    title: Arc<RwLock<Option<String>>>,
    entries: Arc<RwLock<Vec<MockEntry>>>,
    /// 1-based indices in the order items should be yielded.
    yield_order: Arc<RwLock<Option<Vec<u32>>>>,
    /// Overrides the reported item count.
    total_override: Arc<RwLock<Option<Option<usize>>>>,
    /// If set, the next open will fail with this error.
    next_error: Arc<RwLock<Option<ExtractorError>>>,
    open_delay: Arc<RwLock<Duration>>,
    item_delay: Arc<RwLock<Duration>>,
    item_delays: Arc<RwLock<HashMap<u32, Duration>>>,
    requests: Arc<RwLock<Vec<ExtractionRequest>>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    /// Create a new mock extractor with an empty playlist.
    pub fn new() -> Self {
        Self {
            title: Arc::new(RwLock::new(None)),
            entries: Arc::new(RwLock::new(Vec::new())),
            yield_order: Arc::new(RwLock::new(None)),
            total_override: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
            open_delay: Arc::new(RwLock::new(Duration::ZERO)),
            item_delay: Arc::new(RwLock::new(Duration::ZERO)),
            item_delays: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_title(&self, title: impl Into<String>) {
        *self.title.write().await = Some(title.into());
    }

    pub async fn set_entries(&self, entries: Vec<MockEntry>) {
        *self.entries.write().await = entries;
    }

    /// Yield items in the given order of 1-based indices.
    pub async fn set_yield_order(&self, order: Vec<u32>) {
        *self.yield_order.write().await = Some(order);
    }

    /// Report this item count instead of the number of entries.
    pub async fn set_total(&self, total: Option<usize>) {
        *self.total_override.write().await = Some(total);
    }

    /// Configure the next open to fail with the given error.
    pub async fn set_next_error(&self, error: ExtractorError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.write().await = delay;
    }

    /// Delay before every item.
    pub async fn set_item_delay(&self, delay: Duration) {
        *self.item_delay.write().await = delay;
    }

    /// Delay before one item, by 1-based index.
    pub async fn set_item_delay_for(&self, index: u32, delay: Duration) {
        self.item_delays.write().await.insert(index, delay);
    }

    /// Get all requests passed to `open`.
    pub async fn recorded_requests(&self) -> Vec<ExtractionRequest> {
        self.requests.read().await.clone()
    }

    fn build_item(entry: MockEntry, index: u32, request: &ExtractionRequest) -> ExtractedItem {
        let item = PlaylistItem {
            index,
            title: entry.title().to_string(),
            source_url: format!("{}#{}", request.url, index),
        };
        match entry {
            MockEntry::Fetched { title, extension } => ExtractedItem::Fetched {
                local_path: request
                    .output_dir
                    .join(format!("{} - {}.{}", index, title, extension)),
                item,
            },
            MockEntry::Unavailable { .. } => ExtractedItem::Unavailable { item, reason: None },
            MockEntry::Failed { reason, .. } => ExtractedItem::Failed { item, reason },
        }
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self, request: &ExtractionRequest) -> Result<PlaylistSession, ExtractorError> {
        self.requests.write().await.push(request.clone());

        let open_delay = *self.open_delay.read().await;
        if !open_delay.is_zero() {
            tokio::time::sleep(open_delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let entries = self.entries.read().await.clone();
        let order: Vec<u32> = self
            .yield_order
            .read()
            .await
            .clone()
            .unwrap_or_else(|| (1..=entries.len() as u32).collect());
        let total = self
            .total_override
            .read()
            .await
            .unwrap_or(Some(entries.len()));

        let default_delay = *self.item_delay.read().await;
        let delays = self.item_delays.read().await.clone();

        let items: Vec<(ExtractedItem, Duration)> = order
            .into_iter()
            .filter_map(|index| {
                let entry = entries.get(index.checked_sub(1)? as usize)?.clone();
                let delay = delays.get(&index).copied().unwrap_or(default_delay);
                Some((Self::build_item(entry, index, request), delay))
            })
            .collect();

        let stream = futures::stream::iter(items)
            .then(|(item, delay)| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if let ExtractedItem::Fetched { local_path, .. } = &item {
                    let _ = tokio::fs::write(local_path, b"mock media").await;
                }
                item
            })
            .boxed();

        Ok(PlaylistSession {
            title: self.title.read().await.clone(),
            total_items: total,
            items: stream,
        })
    }

    async fn validate(&self) -> Result<(), ExtractorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = MockExtractor::new();
        extractor.set_title("Mix").await;
        extractor
            .set_entries(vec![
                MockEntry::fetched("One", "webm"),
                MockEntry::unavailable("[Private video]"),
                MockEntry::failed("Three", "HTTP Error 403"),
            ])
            .await;

        let session = extractor
            .open(&ExtractionRequest::new("https://example.com/set", dir.path()))
            .await
            .unwrap();
        assert_eq!(session.title.as_deref(), Some("Mix"));
        assert_eq!(session.total_items, Some(3));

        let items: Vec<ExtractedItem> = session.items.collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].local_path().unwrap().exists());
        assert!(matches!(items[1], ExtractedItem::Unavailable { .. }));
        assert!(matches!(items[2], ExtractedItem::Failed { .. }));
    }

    #[tokio::test]
    async fn test_yield_order() {
        let extractor = MockExtractor::new();
        extractor
            .set_entries(vec![
                MockEntry::failed("A", "x"),
                MockEntry::failed("B", "x"),
                MockEntry::failed("C", "x"),
            ])
            .await;
        extractor.set_yield_order(vec![3, 1, 2]).await;

        let session = extractor
            .open(&ExtractionRequest::new("https://example.com/set", "/tmp"))
            .await
            .unwrap();
        let indices: Vec<u32> = session.items.map(|i| i.item().index).collect().await;
        assert_eq!(indices, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_open_error_is_consumed() {
        let extractor = MockExtractor::new();
        extractor
            .set_next_error(ExtractorError::fatal("Unsupported URL"))
            .await;

        let request = ExtractionRequest::new("https://example.com", "/tmp");
        assert!(extractor.open(&request).await.is_err());
        assert!(extractor.open(&request).await.is_ok());
        assert_eq!(extractor.recorded_requests().await.len(), 2);
    }
}
