//! Persistence adapters for the ingestion pipeline.
//!
//! Two storage seams live here, both expressed as async traits so every
//! collaborator has an in-memory or mock double:
//!
//! ```text
//!   ┌──────────────────┐          ┌──────────────────┐
//!   │  MetadataStore   │          │   ContentStore   │
//!   │  (article rows)  │          │  (gzip blobs)    │
//!   └────────┬─────────┘          └────────┬─────────┘
//!            │                             │
//!     ┌──────┴────────┐             ┌──────┴────────┐
//!     ▼               ▼             ▼               ▼
//!  Postgres        in-memory    filesystem     HTTP object
//!  (pgvector)      (tests)      directory      store
//! ```
//!
//! [`MetadataStore`] owns the `articles` and `article_chunks` tables and the
//! transaction boundary around every write. [`ContentStore`] archives the
//! extracted article text as gzip-compressed blobs under date-partitioned
//! keys; the locator it returns is what `articles.article_s3_url` records.

pub mod content;
pub mod memory;
pub mod metadata;
pub mod postgres;

pub use content::{
    ContentStore, FsContentStore, HttpContentStore, archive_key, content_id, gunzip_text,
    gzip_text, open_content_store,
};
pub use memory::MemoryMetadataStore;
pub use metadata::{ArticleField, ArticleRecord, MetadataStore, NewChunk, StoredArticle};
pub use postgres::{PgMetadataStore, connect_pool};
