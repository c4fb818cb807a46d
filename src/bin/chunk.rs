//! Batch binary: chunks every archived article that has no chunks yet, then
//! exits.

use std::sync::Arc;

use newsloom::chunking::{ChunkPass, ChunkingEngine};
use newsloom::config::Settings;
use newsloom::error::Result;
use newsloom::stores::{MetadataStore, PgMetadataStore, connect_pool, open_content_store};
use newsloom::telemetry;
use newsloom::utils::shutdown_token;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let settings = Settings::from_env()?;

    let pool = connect_pool(&settings.database_url).await?;
    let store: Arc<dyn MetadataStore> = Arc::new(PgMetadataStore::new(pool));
    store.ensure_schema().await?;
    let content = open_content_store(&settings.archive, &settings.http)?;

    let engine = ChunkingEngine::new(settings.chunking)?;
    let pass = ChunkPass::new(engine, store, content);
    pass.run(&shutdown_token()).await?;
    Ok(())
}
