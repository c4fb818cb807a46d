//! Sitemap crawler: the producer side of the pipeline.
//!
//! Each cycle walks the site's sitemap index, extracts the per-page sitemap
//! links, pulls the candidate article URLs off every page, and publishes the
//! ones the dedup cache has not seen. The cache is only updated after a
//! publish succeeds, so a broker hiccup leaves the link eligible for the
//! next cycle instead of silently dropping it.

pub mod dedup;

use std::sync::Arc;

use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::CrawlSettings;
use crate::error::{PipelineError, Result};
use crate::http::HttpFetcher;
use crate::queue::WorkQueue;
use crate::utils::sleep_unless_cancelled;

pub use dedup::DedupCache;

/// Anchors inside the sitemap index's navigation block, one per sitemap page.
const SITEMAP_PAGE_SELECTOR: &str =
    r#"section[data-module-name="section"] nav[role="navigation"] a[href]"#;

/// Anchors inside a sitemap page's link grid, one per candidate article.
const ARTICLE_LINK_SELECTOR: &str = r#"section[data-module-name="section"] div a[href]"#;

/// Walks the sitemap and feeds unseen article URLs into the work queue.
pub struct SitemapCrawler {
    fetcher: HttpFetcher,
    queue: Arc<dyn WorkQueue>,
    settings: CrawlSettings,
    cache: DedupCache,
    index_selector: Selector,
    link_selector: Selector,
}

impl std::fmt::Debug for SitemapCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SitemapCrawler")
            .field("root", &self.settings.sitemap_root.as_str())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl SitemapCrawler {
    /// Build a crawler over an existing client and queue. `cache` is usually
    /// seeded from the metadata store's persisted `page_url` column.
    pub fn new(
        fetcher: HttpFetcher,
        queue: Arc<dyn WorkQueue>,
        settings: CrawlSettings,
        cache: DedupCache,
    ) -> Result<Self> {
        Ok(Self {
            index_selector: parse_selector(SITEMAP_PAGE_SELECTOR)?,
            link_selector: parse_selector(ARTICLE_LINK_SELECTOR)?,
            fetcher,
            queue,
            settings,
            cache,
        })
    }

    /// URLs currently recorded as seen.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Fetch the root sitemap index and return the sitemap page URLs it
    /// links to.
    #[instrument(skip(self), err)]
    pub async fn discover_sitemap_pages(&self) -> Result<Vec<Url>> {
        let body = self.fetcher.fetch_text(&self.settings.sitemap_root).await?;
        Ok(self.collect_links(&body, &self.index_selector))
    }

    /// Fetch one sitemap page and return the candidate article URLs on it.
    #[instrument(skip(self), err)]
    pub async fn extract_links(&self, page: &Url) -> Result<Vec<Url>> {
        let body = self.fetcher.fetch_text(page).await?;
        Ok(self.collect_links(&body, &self.link_selector))
    }

    fn collect_links(&self, body: &str, selector: &Selector) -> Vec<Url> {
        let document = Html::parse_document(body);
        let mut links = Vec::new();
        for anchor in document.select(selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() {
                continue;
            }
            match self.settings.sitemap_root.join(href) {
                Ok(url) => links.push(url),
                Err(err) => debug!(href, error = %err, "skipping malformed link"),
            }
        }
        links
    }

    /// Publish every link the cache has not seen. Returns how many links
    /// were published and how many were skipped as already seen.
    pub async fn publish_new(&mut self, links: Vec<Url>) -> (usize, usize) {
        let mut published = 0;
        let mut skipped = 0;
        for link in links {
            let url = link.to_string();
            if self.cache.contains(&url) {
                skipped += 1;
                continue;
            }
            match self.queue.publish(&url).await {
                Ok(()) => {
                    self.cache.insert(url);
                    published += 1;
                }
                Err(err) => warn!(%url, error = %err, "publish failed; link left uncached"),
            }
        }
        (published, skipped)
    }

    /// One full pass: declare the queue, walk the index, process each
    /// sitemap page. A failed page is logged and skipped; only an index-level
    /// failure aborts the cycle.
    #[instrument(skip_all, err)]
    pub async fn cycle(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.queue.declare().await?;
        let pages = self.discover_sitemap_pages().await?;
        info!(pages = pages.len(), "sitemap index fetched");
        for page in pages {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.extract_links(&page).await {
                Ok(links) => {
                    let (published, skipped) = self.publish_new(links).await;
                    info!(%page, published, skipped, "sitemap page processed");
                }
                Err(err) => warn!(%page, error = %err, "sitemap page skipped"),
            }
            if !sleep_unless_cancelled(cancel, self.settings.cycle_delay).await {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Drive perpetual crawl cycles until the token fires. Cycle failures
    /// (broker down, index unreachable) are logged and retried after the
    /// configured delay; nothing here is fatal.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(root = %self.settings.sitemap_root, cached = self.cache.len(), "crawler started");
        while !cancel.is_cancelled() {
            if let Err(err) = self.cycle(&cancel).await {
                warn!(error = %err, "crawl cycle failed");
            }
            if !sleep_unless_cancelled(&cancel, self.settings.cycle_delay).await {
                break;
            }
        }
        info!("crawler stopped");
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|err| PipelineError::Html {
        message: format!("selector {selector:?}: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use crate::queue::MemoryWorkQueue;
    use httpmock::prelude::*;

    fn crawl_settings(server: &MockServer) -> CrawlSettings {
        CrawlSettings {
            sitemap_root: Url::parse(&server.url("/sitemap/1")).unwrap(),
            allowed_hosts: vec!["127.0.0.1".to_string()],
            cycle_delay: std::time::Duration::ZERO,
        }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpSettings {
            retries: 0,
            ..HttpSettings::default()
        })
        .unwrap()
    }

    const INDEX_HTML: &str = r#"
        <html><body>
        <section data-module-name="section">
          <nav role="navigation">
            <a href="/sitemap/1">1</a>
            <a href="/sitemap/2">2</a>
          </nav>
        </section>
        </body></html>
    "#;

    const PAGE_HTML: &str = r#"
        <html><body>
        <section data-module-name="section">
          <nav role="navigation"><a href="/sitemap/1">1</a></nav>
          <div>
            <div>
              <a href="/markets/story-a">A</a>
              <a href="/markets/story-b">B</a>
            </div>
          </div>
        </section>
        </body></html>
    "#;

    #[tokio::test]
    async fn discovers_pages_from_the_navigation_block() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sitemap/1");
                then.status(200).body(INDEX_HTML);
            })
            .await;

        let crawler = SitemapCrawler::new(
            fetcher(),
            Arc::new(MemoryWorkQueue::new()),
            crawl_settings(&server),
            DedupCache::new(),
        )
        .unwrap();

        let pages = crawler.discover_sitemap_pages().await.unwrap();
        let paths: Vec<&str> = pages.iter().map(|url| url.path()).collect();
        assert_eq!(paths, vec!["/sitemap/1", "/sitemap/2"]);
    }

    #[tokio::test]
    async fn extracts_article_links_but_not_navigation_links() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sitemap/2");
                then.status(200).body(PAGE_HTML);
            })
            .await;

        let crawler = SitemapCrawler::new(
            fetcher(),
            Arc::new(MemoryWorkQueue::new()),
            crawl_settings(&server),
            DedupCache::new(),
        )
        .unwrap();

        let page = Url::parse(&server.url("/sitemap/2")).unwrap();
        let links = crawler.extract_links(&page).await.unwrap();
        let paths: Vec<&str> = links.iter().map(|url| url.path()).collect();
        assert_eq!(paths, vec!["/markets/story-a", "/markets/story-b"]);
    }

    #[tokio::test]
    async fn publishes_only_unseen_links() {
        let server = MockServer::start_async().await;
        let queue = Arc::new(MemoryWorkQueue::new());
        let seen = Url::parse(&server.url("/markets/story-b")).unwrap();
        let cache = DedupCache::seed(vec![seen.to_string()]);

        let mut crawler = SitemapCrawler::new(
            fetcher(),
            queue.clone(),
            crawl_settings(&server),
            cache,
        )
        .unwrap();

        let fresh = Url::parse(&server.url("/markets/story-a")).unwrap();
        let (published, skipped) = crawler.publish_new(vec![fresh.clone(), seen]).await;

        assert_eq!((published, skipped), (1, 1));
        assert_eq!(queue.ready_bodies(), vec![fresh.to_string()]);
    }

    #[tokio::test]
    async fn failed_publish_leaves_the_link_uncached() {
        let server = MockServer::start_async().await;
        let queue = Arc::new(MemoryWorkQueue::new());
        queue.fail_publishes(true);

        let mut crawler = SitemapCrawler::new(
            fetcher(),
            queue.clone(),
            crawl_settings(&server),
            DedupCache::new(),
        )
        .unwrap();

        let link = Url::parse(&server.url("/markets/story-a")).unwrap();
        let (published, _) = crawler.publish_new(vec![link.clone()]).await;
        assert_eq!(published, 0);
        assert_eq!(crawler.cached_len(), 0);

        // Broker recovers; the same link publishes on the next attempt.
        queue.fail_publishes(false);
        let (published, _) = crawler.publish_new(vec![link]).await;
        assert_eq!(published, 1);
        assert_eq!(queue.ready_len(), 1);
    }
}
