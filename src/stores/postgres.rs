/*!
PostgreSQL metadata store

`PgMetadataStore` implements the `MetadataStore` trait over a shared
connection pool.

## Behavior

- `ensure_schema` bootstraps the `articles` and `article_chunks` tables (and
  the `vector` extension for the embedding column) so a fresh database serves
  the pipeline without a separate migration step.
- Every write runs inside a transaction; a failed statement rolls the
  transaction back on drop and surfaces as a `Store` error, leaving the
  article in the not-yet-ingested state the worker expects.
- Chunk inserts use `ON CONFLICT DO NOTHING` against the
  `(article_id, chunk_text, token_size)` uniqueness constraint, so re-running
  the chunking pass over an article writes nothing new.

## Schema

- `articles`: auto-increment id, four nullable timestamps, the nullable text
  metadata columns, and the nullable `article_s3_url` blob pointer; unique on
  `page_url`.
- `article_chunks`: chunk text and token size per article id, embedding
  `vector(1536)` nullable until a provider computes it.
*/

use sqlx::{PgPool, Row};
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::stores::metadata::{
    ArticleField, ArticleRecord, MetadataStore, NewChunk, StoredArticle,
};

const ARTICLES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id SERIAL PRIMARY KEY,
    display_datetime TIMESTAMP NULL,
    last_modified_datetime TIMESTAMP NULL,
    publish_datetime TIMESTAMP NULL,
    create_datetime TIMESTAMP NULL,
    content_vertical TEXT NULL,
    og_description TEXT NULL,
    content_type TEXT NULL,
    page_url TEXT NULL UNIQUE,
    og_title TEXT NULL,
    content_title TEXT NULL,
    og_site_name TEXT NULL,
    tags TEXT NULL,
    authors TEXT NULL,
    content_tier TEXT NULL,
    article_s3_url TEXT NULL
)
"#;

const CHUNKS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS article_chunks (
    id SERIAL PRIMARY KEY,
    article_id INTEGER NOT NULL REFERENCES articles(id),
    chunk_text TEXT NOT NULL,
    token_size INTEGER NOT NULL,
    embedding vector(1536) NULL,
    UNIQUE (article_id, chunk_text, token_size)
)
"#;

/// Connect a pool that the metadata store and the Postgres work queue share.
#[instrument(skip(database_url))]
pub async fn connect_pool(database_url: &str) -> Result<PgPool> {
    PgPool::connect(database_url)
        .await
        .map_err(|err| PipelineError::Store {
            message: format!("connect: {err}"),
        })
}

/// PostgreSQL-backed article metadata store.
pub struct PgMetadataStore {
    pool: PgPool,
}

impl std::fmt::Debug for PgMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgMetadataStore").finish()
    }
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `database_url` with a dedicated pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(connect_pool(database_url).await?))
    }
}

#[async_trait::async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self), err)]
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Store {
                message: format!("create vector extension: {err}"),
            })?;
        sqlx::query(ARTICLES_DDL)
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Store {
                message: format!("create articles: {err}"),
            })?;
        sqlx::query(CHUNKS_DDL)
            .execute(&self.pool)
            .await
            .map_err(|err| PipelineError::Store {
                message: format!("create article_chunks: {err}"),
            })?;
        Ok(())
    }

    #[instrument(skip(self, page_url), err)]
    async fn article_exists(&self, page_url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) FROM articles WHERE page_url = $1")
            .bind(page_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| PipelineError::Store {
                message: format!("existence check: {err}"),
            })?;
        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    #[instrument(skip(self, record), fields(page_url = %record.page_url), err)]
    async fn insert_article(&self, record: &ArticleRecord) -> Result<i32> {
        let mut tx = self.pool.begin().await.map_err(|err| PipelineError::Store {
            message: format!("tx begin: {err}"),
        })?;

        let row = sqlx::query(
            r#"
            INSERT INTO articles (
                display_datetime,
                last_modified_datetime,
                publish_datetime,
                create_datetime,
                content_vertical,
                og_description,
                content_type,
                page_url,
                og_title,
                content_title,
                og_site_name,
                tags,
                authors,
                content_tier,
                article_s3_url
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(record.display_datetime)
        .bind(record.last_modified_datetime)
        .bind(record.publish_datetime)
        .bind(record.create_datetime)
        .bind(&record.content_vertical)
        .bind(&record.og_description)
        .bind(&record.content_type)
        .bind(&record.page_url)
        .bind(&record.og_title)
        .bind(&record.content_title)
        .bind(&record.og_site_name)
        .bind(&record.tags)
        .bind(&record.authors)
        .bind(&record.content_tier)
        .bind(&record.article_s3_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| PipelineError::Store {
            message: format!("insert article: {err}"),
        })?;
        let id: i32 = row.get("id");

        tx.commit().await.map_err(|err| PipelineError::Store {
            message: format!("tx commit: {err}"),
        })?;

        info!(id, page_url = %record.page_url, "inserted article");
        Ok(id)
    }

    #[instrument(skip(self), err)]
    async fn text_column(&self, field: ArticleField) -> Result<Vec<String>> {
        let column = field.column_name();
        let statement = format!("SELECT {column} FROM articles WHERE {column} IS NOT NULL");
        let rows = sqlx::query(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| PipelineError::Store {
                message: format!("list {column}: {err}"),
            })?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    #[instrument(skip(self), err)]
    async fn unchunked_archived(&self, limit: i64) -> Result<Vec<StoredArticle>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.page_url, a.article_s3_url
            FROM articles a
            WHERE a.article_s3_url IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM article_chunks c WHERE c.article_id = a.id
              )
            ORDER BY a.id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| PipelineError::Store {
            message: format!("select unchunked: {err}"),
        })?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let page_url: Option<String> = row.get("page_url");
                StoredArticle {
                    id: row.get("id"),
                    page_url: page_url.unwrap_or_default(),
                    archive_url: row.get("article_s3_url"),
                }
            })
            .collect())
    }

    #[instrument(skip(self, chunks), fields(count = chunks.len()), err)]
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<u64> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(|err| PipelineError::Store {
            message: format!("tx begin: {err}"),
        })?;

        let mut inserted = 0u64;
        for chunk in chunks {
            let result = sqlx::query(
                r#"
                INSERT INTO article_chunks (article_id, chunk_text, token_size, embedding)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (article_id, chunk_text, token_size) DO NOTHING
                "#,
            )
            .bind(chunk.article_id)
            .bind(&chunk.chunk_text)
            .bind(chunk.token_size)
            .bind(chunk.embedding.clone())
            .execute(&mut *tx)
            .await
            .map_err(|err| PipelineError::Store {
                message: format!("insert chunk: {err}"),
            })?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(|err| PipelineError::Store {
            message: format!("tx commit: {err}"),
        })?;
        Ok(inserted)
    }
}
