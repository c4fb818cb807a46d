//! Batch pass that turns archived article bodies into stored chunks.
//!
//! Each pass selects archived articles that have no chunks yet, downloads and
//! decompresses every body, runs the chunking engine, and bulk-inserts the
//! resulting rows. Chunk insertion is transactional per article, so an
//! article is either fully chunked or not chunked at all and the selection
//! query stays truthful across crashes and re-runs.

use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::chunking::engine::ChunkingEngine;
use crate::error::{PipelineError, Result};
use crate::stores::content::{ContentStore, gunzip_text};
use crate::stores::metadata::{MetadataStore, NewChunk, StoredArticle};

/// Output width of the embedding column.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

const DEFAULT_BATCH: i64 = 100;

/// Batch text-to-vector seam.
///
/// Implementations return one vector per input text, in input order, each
/// `dimensions()` wide. No provider client ships with the pipeline; wire one
/// in through [`ChunkPass::with_embedder`].
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>>;
}

/// Counters for one drain of the unchunked backlog. Articles whose bodies
/// clean down to nothing are counted in `articles` but in neither `chunked`
/// nor `failed`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Articles attempted.
    pub articles: usize,
    /// Articles that produced at least one stored chunk.
    pub chunked: usize,
    /// Articles skipped after an error, left for a later run.
    pub failed: usize,
    /// Chunk rows inserted.
    pub chunks: u64,
}

/// Drives the chunking engine over the archived backlog.
pub struct ChunkPass {
    engine: ChunkingEngine,
    store: Arc<dyn MetadataStore>,
    content: Arc<dyn ContentStore>,
    embedder: Option<Arc<dyn Embedder>>,
    batch_size: i64,
}

impl std::fmt::Debug for ChunkPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPass")
            .field("engine", &self.engine)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl ChunkPass {
    pub fn new(
        engine: ChunkingEngine,
        store: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            engine,
            store,
            content,
            embedder: None,
            batch_size: DEFAULT_BATCH,
        }
    }

    /// Attach an embedding provider; chunk rows then carry vectors instead of
    /// a null embedding column.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Chunk one article end to end. Returns the number of rows inserted;
    /// zero when the body cleans down to nothing.
    #[instrument(skip(self, article), fields(article_id = article.id), err)]
    async fn process_article(&self, article: &StoredArticle) -> Result<u64> {
        let blob = self.content.get(&article.archive_url).await?;
        let body = gunzip_text(&blob)?;
        let chunks = self.engine.chunk(&body)?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings: Vec<Option<Vector>> = match &self.embedder {
            Some(embedder) => {
                let texts: Vec<String> =
                    chunks.iter().map(|chunk| chunk.text.clone()).collect();
                let vectors = embedder.embed(&texts).await?;
                if vectors.len() != chunks.len() {
                    return Err(PipelineError::Chunking {
                        message: format!(
                            "embedder returned {} vectors for {} chunks",
                            vectors.len(),
                            chunks.len()
                        ),
                    });
                }
                vectors.into_iter().map(Some).collect()
            }
            None => vec![None; chunks.len()],
        };

        let rows: Vec<NewChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewChunk {
                article_id: article.id,
                chunk_text: chunk.text,
                token_size: chunk.token_size as i32,
                embedding,
            })
            .collect();
        self.store.insert_chunks(&rows).await
    }

    /// Drain the backlog: page through unchunked archived articles until none
    /// remain or the token is cancelled. A failing or chunk-less article is
    /// attempted once per run, so a stuck row cannot spin the driver.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let mut attempted: FxHashSet<i32> = FxHashSet::default();

        'batches: loop {
            let batch = self.store.unchunked_archived(self.batch_size).await?;
            let fresh: Vec<StoredArticle> = batch
                .into_iter()
                .filter(|article| !attempted.contains(&article.id))
                .collect();
            if fresh.is_empty() {
                break;
            }

            for article in fresh {
                if cancel.is_cancelled() {
                    info!("chunk pass cancelled");
                    break 'batches;
                }
                attempted.insert(article.id);
                summary.articles += 1;
                match self.process_article(&article).await {
                    Ok(0) => {
                        debug!(article_id = article.id, "body cleaned to nothing; no chunks");
                    }
                    Ok(inserted) => {
                        summary.chunked += 1;
                        summary.chunks += inserted;
                        info!(article_id = article.id, inserted, "chunked article");
                    }
                    Err(err) => {
                        summary.failed += 1;
                        warn!(
                            article_id = article.id,
                            error = %err,
                            "chunking failed; leaving article for a later run"
                        );
                    }
                }
            }
        }

        info!(
            articles = summary.articles,
            chunked = summary.chunked,
            failed = summary.failed,
            chunks = summary.chunks,
            "chunk pass finished"
        );
        Ok(summary)
    }
}
