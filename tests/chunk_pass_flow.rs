//! Ingest-then-chunk flow: archived bodies come back out of the blob store
//! and land as bounded chunk rows, idempotently.

mod common;
use common::*;

use std::sync::Arc;

use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;

use newsloom::chunking::{ChunkPass, ChunkingEngine, EMBEDDING_DIMENSIONS, is_balanced};
use newsloom::config::ChunkBounds;
use newsloom::queue::{MemoryWorkQueue, WorkQueue};
use newsloom::stores::content::FsContentStore;
use newsloom::stores::memory::MemoryMetadataStore;
use newsloom::worker::{IngestionWorker, Outcome};

struct Rig {
    store: Arc<MemoryMetadataStore>,
    content: Arc<FsContentStore>,
    _archive_dir: tempfile::TempDir,
}

/// Fetch the long fixture article through the worker so the pass starts from
/// a realistically archived row.
async fn ingest_long_article(server: &MockServer) -> Rig {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/news/long-session");
            then.status(200).body(long_article_html());
        })
        .await;

    let queue = Arc::new(MemoryWorkQueue::new());
    let store = Arc::new(MemoryMetadataStore::new());
    let archive_dir = tempfile::tempdir().unwrap();
    let content = Arc::new(FsContentStore::new(archive_dir.path()));

    let worker = IngestionWorker::new(
        fetcher(),
        queue.clone(),
        store.clone(),
        content.clone(),
        worker_settings(),
    )
    .unwrap();
    queue.publish(&server.url("/news/long-session")).await.unwrap();
    let outcomes = worker.drain_available().await.unwrap();
    assert!(matches!(outcomes[0], Outcome::Ingested { .. }));

    Rig {
        store,
        content,
        _archive_dir: archive_dir,
    }
}

fn pass(rig: &Rig) -> ChunkPass {
    ChunkPass::new(
        ChunkingEngine::new(ChunkBounds::default()).unwrap(),
        rig.store.clone(),
        rig.content.clone(),
    )
}

#[tokio::test]
async fn test_archived_article_becomes_bounded_chunks() {
    let server = MockServer::start_async().await;
    let rig = ingest_long_article(&server).await;
    let bounds = ChunkBounds::default();

    let summary = pass(&rig).run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.articles, 1);
    assert_eq!(summary.chunked, 1);

    let rows = rig.store.chunks();
    assert!(rows.len() > 1, "long body splits into several chunks");
    for row in &rows {
        assert!(!row.chunk_text.is_empty());
        assert!(row.token_size as usize <= bounds.upper);
        assert!(is_balanced(&row.chunk_text));
        assert!(row.embedding.is_none());
    }
    // Non-final chunks respect the lower bound too.
    for row in &rows[..rows.len() - 1] {
        assert!(row.token_size as usize >= bounds.lower);
    }

    // The pass is idempotent: a re-run finds nothing to do.
    let again = pass(&rig).run(&CancellationToken::new()).await.unwrap();
    assert_eq!(again.articles, 0);
    assert_eq!(rig.store.chunks().len(), rows.len());
}

#[tokio::test]
async fn test_chunks_carry_embeddings_when_a_provider_is_configured() {
    let server = MockServer::start_async().await;
    let rig = ingest_long_article(&server).await;

    let summary = pass(&rig)
        .with_embedder(length_embedder())
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.chunked, 1);

    let rows = rig.store.chunks();
    assert!(!rows.is_empty());
    for row in rows {
        let embedding = row.embedding.expect("provider fills the vector column");
        assert_eq!(embedding.as_slice().len(), EMBEDDING_DIMENSIONS);
        assert_eq!(embedding.as_slice()[0], row.chunk_text.len() as f32);
    }
}
