//! Consumer binary: drains the link queue into article rows and archived
//! body blobs.

use std::sync::Arc;

use newsloom::config::Settings;
use newsloom::error::Result;
use newsloom::http::HttpFetcher;
use newsloom::queue::{PgWorkQueue, WorkQueue};
use newsloom::stores::{MetadataStore, PgMetadataStore, connect_pool, open_content_store};
use newsloom::telemetry;
use newsloom::utils::shutdown_token;
use newsloom::worker::{IngestionWorker, WorkerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let settings = Settings::from_env()?;

    let pool = connect_pool(&settings.database_url).await?;
    let store: Arc<dyn MetadataStore> = Arc::new(PgMetadataStore::new(pool.clone()));
    store.ensure_schema().await?;

    let queue: Arc<dyn WorkQueue> = Arc::new(PgWorkQueue::new(pool, &settings.queue));
    let content = open_content_store(&settings.archive, &settings.http)?;
    let fetcher = HttpFetcher::new(&settings.http)?;

    let worker = IngestionWorker::new(
        fetcher,
        queue,
        store,
        content,
        WorkerSettings::from_settings(&settings),
    )?;

    worker.run(shutdown_token()).await;
    Ok(())
}
