//! In-memory metadata store for tests and local experiments.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::stores::metadata::{
    ArticleField, ArticleRecord, MetadataStore, NewChunk, StoredArticle,
};

/// Volatile [`MetadataStore`] with the same visible behavior as the Postgres
/// backend: unique `page_url`, conflict-ignoring chunk inserts, and an
/// optional induced insert failure for exercising the rollback path.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<State>,
    fail_inserts: AtomicBool,
}

#[derive(Debug, Default)]
struct State {
    next_id: i32,
    articles: Vec<(i32, ArticleRecord)>,
    chunks: Vec<NewChunk>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert_article` fail.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn article_count(&self) -> usize {
        self.inner.lock().articles.len()
    }

    pub fn article(&self, page_url: &str) -> Option<ArticleRecord> {
        self.inner
            .lock()
            .articles
            .iter()
            .find(|(_, record)| record.page_url == page_url)
            .map(|(_, record)| record.clone())
    }

    pub fn chunks(&self) -> Vec<NewChunk> {
        self.inner.lock().chunks.clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn article_exists(&self, page_url: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .articles
            .iter()
            .any(|(_, record)| record.page_url == page_url))
    }

    async fn insert_article(&self, record: &ArticleRecord) -> Result<i32> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(PipelineError::Store {
                message: "insert article: induced failure".to_string(),
            });
        }
        let mut state = self.inner.lock();
        if state
            .articles
            .iter()
            .any(|(_, existing)| existing.page_url == record.page_url)
        {
            return Err(PipelineError::Store {
                message: format!("insert article: duplicate page_url {:?}", record.page_url),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        state.articles.push((id, record.clone()));
        Ok(id)
    }

    async fn text_column(&self, field: ArticleField) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .articles
            .iter()
            .filter_map(|(_, record)| record.text_field(field).map(str::to_string))
            .collect())
    }

    async fn unchunked_archived(&self, limit: i64) -> Result<Vec<StoredArticle>> {
        let state = self.inner.lock();
        Ok(state
            .articles
            .iter()
            .filter(|(id, record)| {
                record.article_s3_url.is_some()
                    && !state.chunks.iter().any(|chunk| chunk.article_id == *id)
            })
            .take(limit.max(0) as usize)
            .map(|(id, record)| StoredArticle {
                id: *id,
                page_url: record.page_url.clone(),
                archive_url: record.article_s3_url.clone().unwrap_or_default(),
            })
            .collect())
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<u64> {
        let mut state = self.inner.lock();
        let mut inserted = 0u64;
        for chunk in chunks {
            let duplicate = state.chunks.iter().any(|existing| {
                existing.article_id == chunk.article_id
                    && existing.chunk_text == chunk.chunk_text
                    && existing.token_size == chunk.token_size
            });
            if !duplicate {
                state.chunks.push(chunk.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
