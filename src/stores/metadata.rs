//! Article metadata records and the relational store seam.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use url::Url;

use crate::error::{PipelineError, Result};

/// One row of the `articles` table, assembled by the ingestion worker.
///
/// Every field except `page_url` is optional: a page that publishes no
/// `og:description` still produces a valid record. The archived-content
/// pointer (`article_s3_url`) stays `None` when the blob upload failed,
/// which marks the row as partially ingested and excludes it from the
/// chunking pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub display_datetime: Option<NaiveDateTime>,
    pub last_modified_datetime: Option<NaiveDateTime>,
    pub publish_datetime: Option<NaiveDateTime>,
    pub create_datetime: Option<NaiveDateTime>,
    pub content_vertical: Option<String>,
    pub og_description: Option<String>,
    pub content_type: Option<String>,
    pub page_url: String,
    pub og_title: Option<String>,
    pub content_title: Option<String>,
    pub og_site_name: Option<String>,
    pub tags: Option<String>,
    pub authors: Option<String>,
    pub content_tier: Option<String>,
    pub article_s3_url: Option<String>,
}

impl ArticleRecord {
    /// Build an empty record for `page_url`, validating the URL up front.
    ///
    /// The URL must parse as an absolute `http`/`https` URL with a host;
    /// anything else is rejected here rather than surfacing later as a
    /// malformed row.
    pub fn new(page_url: impl Into<String>) -> Result<Self> {
        let page_url = page_url.into();
        let parsed = Url::parse(&page_url).map_err(|err| {
            PipelineError::InvalidRecord(format!("page_url {page_url:?}: {err}"))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PipelineError::InvalidRecord(format!(
                "page_url {page_url:?}: unsupported scheme {:?}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(PipelineError::InvalidRecord(format!(
                "page_url {page_url:?}: missing host"
            )));
        }
        Ok(Self {
            display_datetime: None,
            last_modified_datetime: None,
            publish_datetime: None,
            create_datetime: None,
            content_vertical: None,
            og_description: None,
            content_type: None,
            page_url,
            og_title: None,
            content_title: None,
            og_site_name: None,
            tags: None,
            authors: None,
            content_tier: None,
            article_s3_url: None,
        })
    }

    /// Read one of the queryable text columns off this record.
    pub fn text_field(&self, field: ArticleField) -> Option<&str> {
        match field {
            ArticleField::ContentVertical => self.content_vertical.as_deref(),
            ArticleField::OgDescription => self.og_description.as_deref(),
            ArticleField::ContentType => self.content_type.as_deref(),
            ArticleField::PageUrl => Some(&self.page_url),
            ArticleField::OgTitle => self.og_title.as_deref(),
            ArticleField::ContentTitle => self.content_title.as_deref(),
            ArticleField::OgSiteName => self.og_site_name.as_deref(),
            ArticleField::Tags => self.tags.as_deref(),
            ArticleField::Authors => self.authors.as_deref(),
            ArticleField::ContentTier => self.content_tier.as_deref(),
            ArticleField::ArticleS3Url => self.article_s3_url.as_deref(),
        }
    }
}

/// The fixed set of text columns that may be listed through
/// [`MetadataStore::text_column`]. Columns outside this enum are
/// unrepresentable in the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleField {
    ContentVertical,
    OgDescription,
    ContentType,
    PageUrl,
    OgTitle,
    ContentTitle,
    OgSiteName,
    Tags,
    Authors,
    ContentTier,
    ArticleS3Url,
}

impl ArticleField {
    /// Column name in the `articles` table.
    pub const fn column_name(self) -> &'static str {
        match self {
            ArticleField::ContentVertical => "content_vertical",
            ArticleField::OgDescription => "og_description",
            ArticleField::ContentType => "content_type",
            ArticleField::PageUrl => "page_url",
            ArticleField::OgTitle => "og_title",
            ArticleField::ContentTitle => "content_title",
            ArticleField::OgSiteName => "og_site_name",
            ArticleField::Tags => "tags",
            ArticleField::Authors => "authors",
            ArticleField::ContentTier => "content_tier",
            ArticleField::ArticleS3Url => "article_s3_url",
        }
    }
}

/// A persisted article as seen by the chunking pass: its row id plus the
/// locator of the archived text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArticle {
    pub id: i32,
    pub page_url: String,
    pub archive_url: String,
}

/// One `article_chunks` row ready for insertion. The embedding stays `None`
/// until a provider computes it.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub article_id: i32,
    pub chunk_text: String,
    pub token_size: i32,
    pub embedding: Option<pgvector::Vector>,
}

/// Relational store for article metadata and chunk rows.
///
/// Implementations own the transaction boundary: a write either commits
/// fully or rolls back and leaves the store untouched. The worker treats a
/// rolled-back insert as "not yet ingested", so the same URL is safe to
/// ingest again on a later crawl.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the `articles` and `article_chunks` tables when absent, so a
    /// fresh database serves the pipeline without a separate migration step.
    async fn ensure_schema(&self) -> Result<()>;

    /// True when a record with this `page_url` already exists.
    async fn article_exists(&self, page_url: &str) -> Result<bool>;

    /// Insert one article row and return its id. Fails on a duplicate
    /// `page_url`; the caller decides whether that is a race to log or a
    /// bug to surface.
    async fn insert_article(&self, record: &ArticleRecord) -> Result<i32>;

    /// List the non-null values of one queryable text column. The crawler
    /// seeds its dedup cache from [`ArticleField::PageUrl`].
    async fn text_column(&self, field: ArticleField) -> Result<Vec<String>>;

    /// Articles with an archived blob but no chunk rows yet, oldest first.
    async fn unchunked_archived(&self, limit: i64) -> Result<Vec<StoredArticle>>;

    /// Bulk-insert chunk rows with conflict-ignore semantics; returns how
    /// many rows were actually written. Re-running the pass over the same
    /// article is a no-op.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<u64>;
}
