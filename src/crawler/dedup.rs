//! In-memory record of already-seen article URLs.

use rustc_hash::FxHashSet;

/// Set of URLs known to have been enqueued or ingested.
///
/// The cache is a conservative record: losing it only means a link gets
/// re-published and caught by the worker's existence check, while a false
/// positive would silently drop a genuinely new link. It is rebuilt at
/// startup from the persisted `page_url` column and grows as the crawler
/// publishes.
#[derive(Debug, Default)]
pub struct DedupCache {
    seen: FxHashSet<String>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the cache from previously persisted URLs.
    pub fn seed(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            seen: urls.into_iter().collect(),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Record a URL; returns false when it was already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        self.seen.insert(url.into())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
