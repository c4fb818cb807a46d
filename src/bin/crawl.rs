//! Producer binary: walks the sitemap and publishes unseen article links.

use std::sync::Arc;

use tracing::info;

use newsloom::config::Settings;
use newsloom::crawler::{DedupCache, SitemapCrawler};
use newsloom::error::Result;
use newsloom::http::HttpFetcher;
use newsloom::queue::{PgWorkQueue, WorkQueue};
use newsloom::stores::{ArticleField, MetadataStore, PgMetadataStore, connect_pool};
use newsloom::telemetry;
use newsloom::utils::shutdown_token;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let settings = Settings::from_env()?;

    let pool = connect_pool(&settings.database_url).await?;
    let store = PgMetadataStore::new(pool.clone());
    store.ensure_schema().await?;

    let cache = DedupCache::seed(store.text_column(ArticleField::PageUrl).await?);
    info!(seeded = cache.len(), "dedup cache primed from stored articles");

    let queue: Arc<dyn WorkQueue> = Arc::new(PgWorkQueue::new(pool, &settings.queue));
    let fetcher = HttpFetcher::new(&settings.http)?;
    let mut crawler = SitemapCrawler::new(fetcher, queue, settings.crawl.clone(), cache)?;

    crawler.run(shutdown_token()).await;
    Ok(())
}
