//! Ingestion worker: the consumer side of the pipeline.
//!
//! The worker pulls one link at a time, runs it through
//! fetch → parse → dedup-check → archive → persist, and acknowledges the
//! message no matter which branch was taken: every branch is a terminal,
//! recorded outcome (success, skip, or logged drop), never a transient
//! condition worth re-delivering. Holding at most one unacknowledged message
//! is the pipeline's backpressure control.

pub mod extract;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{Settings, ThrottleSettings};
use crate::error::Result;
use crate::http::HttpFetcher;
use crate::queue::WorkQueue;
use crate::stores::content::{ContentStore, archive_key, content_id, gzip_text};
use crate::stores::metadata::MetadataStore;
use crate::utils::sleep_unless_cancelled;

pub use extract::{ArticleExtractor, Extraction, ParsedArticle, Rejection, combine_date_time};

/// Knobs the worker pulls from the top-level settings.
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub allowed_hosts: Vec<String>,
    pub archive_prefix: String,
    /// Poll interval while the queue is empty.
    pub poll_interval: Duration,
    /// Fixed delay before retrying after a broker failure.
    pub reconnect_delay: Duration,
    pub throttle: ThrottleSettings,
}

impl WorkerSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            allowed_hosts: settings.crawl.allowed_hosts.clone(),
            archive_prefix: settings.archive.prefix.clone(),
            poll_interval: settings.queue.poll_interval,
            reconnect_delay: settings.queue.reconnect_delay,
            throttle: settings.throttle,
        }
    }
}

/// Terminal outcome of handling one delivered link. Every variant is
/// acknowledged; nothing is pushed back to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Record persisted, with or without an archive pointer.
    Ingested { article_id: i32, response_len: usize },
    /// The payload was not an absolute http(s) URL.
    InvalidUrl,
    /// Host not in the allow-list; dropped before any fetch.
    DisallowedHost,
    /// A record with this URL already exists.
    AlreadyIngested,
    /// Fetch failed after the retry policy was exhausted; link dropped.
    FetchFailed,
    /// The document failed a parse gate.
    Rejected {
        rejection: Rejection,
        response_len: usize,
    },
    /// A metadata store call failed; any open transaction rolled back.
    StoreFailed { response_len: usize },
}

impl Outcome {
    /// Fetched body length, for the outbound throttle. Zero when no body
    /// was fetched.
    pub fn response_len(&self) -> usize {
        match self {
            Outcome::Ingested { response_len, .. }
            | Outcome::Rejected { response_len, .. }
            | Outcome::StoreFailed { response_len } => *response_len,
            _ => 0,
        }
    }
}

/// Consumes sitemap links from the queue and turns them into article rows
/// plus archived body blobs.
pub struct IngestionWorker {
    fetcher: HttpFetcher,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn MetadataStore>,
    content: Arc<dyn ContentStore>,
    extractor: ArticleExtractor,
    settings: WorkerSettings,
}

impl std::fmt::Debug for IngestionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionWorker")
            .field("allowed_hosts", &self.settings.allowed_hosts)
            .finish()
    }
}

impl IngestionWorker {
    pub fn new(
        fetcher: HttpFetcher,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentStore>,
        settings: WorkerSettings,
    ) -> Result<Self> {
        Ok(Self {
            extractor: ArticleExtractor::new()?,
            fetcher,
            queue,
            store,
            content,
            settings,
        })
    }

    fn host_allowed(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| {
                let host = host.to_ascii_lowercase();
                self.settings.allowed_hosts.iter().any(|allowed| *allowed == host)
            })
            .unwrap_or(false)
    }

    /// Compress and upload the body. A failure here yields no pointer and
    /// never aborts ingestion.
    async fn archive(&self, parsed: &ParsedArticle, url: &Url) -> Option<String> {
        let id = content_id(url.as_str());
        let key = archive_key(&self.settings.archive_prefix, parsed.publish_datetime, &id);
        let blob = match gzip_text(&parsed.body) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(error = %err, "compress failed; storing without archive pointer");
                return None;
            }
        };
        debug!(
            key,
            original = parsed.body.len(),
            compressed = blob.len(),
            "archiving body"
        );
        match self.content.put(&key, blob).await {
            Ok(locator) => Some(locator),
            Err(err) => {
                warn!(error = %err, "archive upload failed; storing without pointer");
                None
            }
        }
    }

    /// Process one delivered payload end to end. Each early return is a
    /// terminal outcome; the caller acknowledges regardless.
    #[instrument(skip(self), fields(url = payload))]
    pub async fn handle(&self, payload: &str) -> Outcome {
        let url = match Url::parse(payload) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
            Ok(url) => {
                warn!(scheme = url.scheme(), "unsupported scheme; dropping");
                return Outcome::InvalidUrl;
            }
            Err(err) => {
                warn!(error = %err, "unparseable payload; dropping");
                return Outcome::InvalidUrl;
            }
        };

        if !self.host_allowed(&url) {
            info!("host not allow-listed; dropping");
            return Outcome::DisallowedHost;
        }

        match self.store.article_exists(url.as_str()).await {
            Ok(true) => {
                debug!("already ingested");
                return Outcome::AlreadyIngested;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "existence check failed");
                return Outcome::StoreFailed { response_len: 0 };
            }
        }

        let html = match self.fetcher.fetch_text(&url).await {
            Ok(html) => html,
            Err(err) => {
                warn!(error = %err, "fetch failed; dropping link");
                return Outcome::FetchFailed;
            }
        };
        let response_len = html.len();

        let parsed = match self.extractor.extract(&html) {
            Extraction::Article(parsed) => *parsed,
            Extraction::Rejected(rejection) => {
                info!(%rejection, "document rejected");
                return Outcome::Rejected {
                    rejection,
                    response_len,
                };
            }
        };

        let archive_url = self.archive(&parsed, &url).await;

        let mut record = match parsed.into_record(&url) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "record rejected at construction");
                return Outcome::InvalidUrl;
            }
        };
        record.article_s3_url = archive_url;

        match self.store.insert_article(&record).await {
            Ok(article_id) => {
                info!(article_id, archived = record.article_s3_url.is_some(), "ingested");
                Outcome::Ingested {
                    article_id,
                    response_len,
                }
            }
            Err(err) => {
                warn!(error = %err, "insert failed; record rolled back");
                Outcome::StoreFailed { response_len }
            }
        }
    }

    /// Drain every currently-available message, acknowledging each one after
    /// it is handled. Returns the outcomes in processing order.
    pub async fn drain_available(&self) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        while let Some(delivery) = self.queue.receive().await? {
            let outcome = self.handle(&delivery.body).await;
            self.queue.ack(&delivery).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Consume until cancelled. Broker failures re-declare the queue after a
    /// fixed delay; cancellation is honored at poll and post-ack boundaries,
    /// so in-flight work always finishes.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("worker started");
        'outer: while !cancel.is_cancelled() {
            if let Err(err) = self.queue.declare().await {
                warn!(error = %err, "queue declare failed; reconnecting");
                if !sleep_unless_cancelled(&cancel, self.settings.reconnect_delay).await {
                    break;
                }
                continue;
            }

            while !cancel.is_cancelled() {
                let delivery = match self.queue.receive().await {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        if !sleep_unless_cancelled(&cancel, self.settings.poll_interval).await {
                            break 'outer;
                        }
                        continue;
                    }
                    Err(err) => {
                        warn!(error = %err, "receive failed; reconnecting");
                        if !sleep_unless_cancelled(&cancel, self.settings.reconnect_delay).await {
                            break 'outer;
                        }
                        continue 'outer;
                    }
                };

                let outcome = self.handle(&delivery.body).await;
                if let Err(err) = self.queue.ack(&delivery).await {
                    warn!(id = delivery.id, error = %err, "ack failed; message will be redelivered");
                }

                let throttle = self.settings.throttle.delay_for(outcome.response_len());
                if !throttle.is_zero()
                    && !sleep_unless_cancelled(&cancel, throttle).await
                {
                    break 'outer;
                }
            }
        }
        info!("worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use crate::queue::MemoryWorkQueue;
    use crate::stores::content::{FsContentStore, gunzip_text};
    use crate::stores::memory::MemoryMetadataStore;
    use httpmock::prelude::*;

    const ARTICLE_HTML: &str = r#"
        <html lang="en">
        <head>
          <meta property="og:type" content="article">
          <meta property="og:title" content="Markets Rally">
          <meta name="publish_date" content="20250307">
          <meta name="publish_time" content="09:30">
        </head>
        <body>
          <article><p>Stocks opened higher on Friday.</p></article>
        </body>
        </html>
    "#;

    const GERMAN_HTML: &str = r#"
        <html lang="de">
        <head><meta property="og:type" content="article"></head>
        <body><article><p>Die Börse eröffnete freundlich.</p></article></body>
        </html>
    "#;

    struct Harness {
        worker: IngestionWorker,
        queue: Arc<MemoryWorkQueue>,
        store: Arc<MemoryMetadataStore>,
        _archive_dir: tempfile::TempDir,
    }

    fn harness(server: &MockServer) -> Harness {
        let queue = Arc::new(MemoryWorkQueue::new());
        let store = Arc::new(MemoryMetadataStore::new());
        let archive_dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&HttpSettings {
            retries: 0,
            ..HttpSettings::default()
        })
        .unwrap();
        let settings = WorkerSettings {
            allowed_hosts: vec!["127.0.0.1".to_string()],
            archive_prefix: "articles".to_string(),
            poll_interval: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            throttle: ThrottleSettings {
                bytes_per_ms: u64::MAX,
                max_delay: Duration::ZERO,
            },
        };
        let worker = IngestionWorker::new(
            fetcher,
            queue.clone(),
            store.clone(),
            Arc::new(FsContentStore::new(archive_dir.path())),
            settings,
        )
        .unwrap();
        Harness {
            worker,
            queue,
            store,
            _archive_dir: archive_dir,
        }
    }

    #[tokio::test]
    async fn ingests_an_article_and_archives_its_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/markets/rally");
                then.status(200).body(ARTICLE_HTML);
            })
            .await;
        let h = harness(&server);

        let url = server.url("/markets/rally");
        let outcome = h.worker.handle(&url).await;

        let Outcome::Ingested { article_id, response_len } = outcome else {
            panic!("expected ingestion, got {outcome:?}");
        };
        assert_eq!(article_id, 1);
        assert_eq!(response_len, ARTICLE_HTML.len());

        let record = h.store.article(&url).unwrap();
        assert_eq!(record.og_title.as_deref(), Some("Markets Rally"));
        assert!(record.publish_datetime.is_some());

        let locator = record.article_s3_url.unwrap();
        assert!(locator.contains("/2025/03/07/"));
        let blob = std::fs::read(&locator).unwrap();
        assert_eq!(
            gunzip_text(&blob).unwrap(),
            "Stocks opened higher on Friday."
        );
    }

    #[tokio::test]
    async fn disallowed_host_is_dropped_without_a_fetch() {
        let server = MockServer::start_async().await;
        let probe = server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).body(ARTICLE_HTML);
            })
            .await;
        let mut h = harness(&server);
        h.worker.settings.allowed_hosts = vec!["news.example.com".to_string()];

        let outcome = h.worker.handle(&server.url("/markets/rally")).await;
        assert_eq!(outcome, Outcome::DisallowedHost);
        assert_eq!(probe.hits_async().await, 0);
        assert_eq!(h.store.article_count(), 0);
    }

    #[tokio::test]
    async fn known_url_is_skipped_without_a_fetch() {
        let server = MockServer::start_async().await;
        let probe = server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).body(ARTICLE_HTML);
            })
            .await;
        let h = harness(&server);

        let url = server.url("/markets/rally");
        let seeded = crate::stores::metadata::ArticleRecord::new(&url).unwrap();
        h.store.insert_article(&seeded).await.unwrap();

        let outcome = h.worker.handle(&url).await;
        assert_eq!(outcome, Outcome::AlreadyIngested);
        assert_eq!(probe.hits_async().await, 0);
        assert_eq!(h.store.article_count(), 1);
    }

    #[tokio::test]
    async fn non_english_page_writes_nothing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/de/artikel");
                then.status(200).body(GERMAN_HTML);
            })
            .await;
        let h = harness(&server);

        let outcome = h.worker.handle(&server.url("/de/artikel")).await;
        assert!(matches!(
            outcome,
            Outcome::Rejected {
                rejection: Rejection::Language { .. },
                ..
            }
        ));
        assert_eq!(h.store.article_count(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_drops_the_link() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(500);
            })
            .await;
        let h = harness(&server);

        let outcome = h.worker.handle(&server.url("/gone")).await;
        assert_eq!(outcome, Outcome::FetchFailed);
        assert_eq!(h.store.article_count(), 0);
    }

    #[tokio::test]
    async fn insert_failure_is_terminal_but_not_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/markets/rally");
                then.status(200).body(ARTICLE_HTML);
            })
            .await;
        let h = harness(&server);
        h.store.fail_inserts(true);

        let outcome = h.worker.handle(&server.url("/markets/rally")).await;
        assert!(matches!(outcome, Outcome::StoreFailed { .. }));
        assert_eq!(h.store.article_count(), 0);
    }

    #[tokio::test]
    async fn garbage_payload_is_discarded() {
        let server = MockServer::start_async().await;
        let h = harness(&server);
        assert_eq!(h.worker.handle("not a url").await, Outcome::InvalidUrl);
        assert_eq!(
            h.worker.handle("ftp://example.com/file").await,
            Outcome::InvalidUrl
        );
    }

    #[tokio::test]
    async fn drain_acknowledges_every_outcome() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/markets/rally");
                then.status(200).body(ARTICLE_HTML);
            })
            .await;
        let h = harness(&server);

        let url = server.url("/markets/rally");
        h.queue.publish(&url).await.unwrap();
        h.queue.publish(&url).await.unwrap();
        h.queue.publish("not a url").await.unwrap();

        let outcomes = h.worker.drain_available().await.unwrap();
        assert!(matches!(outcomes[0], Outcome::Ingested { .. }));
        assert_eq!(outcomes[1], Outcome::AlreadyIngested);
        assert_eq!(outcomes[2], Outcome::InvalidUrl);
        assert_eq!(h.queue.ready_len(), 0);
        assert_eq!(h.queue.unacked_len(), 0);
    }
}
