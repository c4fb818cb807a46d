//! # Newsloom: Sitemap Crawl-and-Ingest Pipeline
//!
//! Newsloom walks a news site's sitemap, queues article links through a
//! durable at-least-once work queue, ingests each article into Postgres with
//! its body archived as a gzip blob, and later packs archived bodies into
//! token-bounded, punctuation-balanced chunks.
//!
//! ```text
//! SitemapCrawler ──► WorkQueue (durable, prefetch = 1) ──► IngestionWorker
//!                                                              │
//!                               fetch ─► parse gates ─► archive ─► persist
//!                                                          │          │
//!                                                    ContentStore  MetadataStore
//!                                                    (gzip blobs)   (postgres)
//!                                                                      │
//!                          ChunkPass ◄─── unchunked archived backlog ──┘
//!                              │
//!                       ChunkingEngine ──► article_chunks rows
//! ```
//!
//! ## Pipeline Stages
//!
//! - **Crawl** ([`crawler`]): discover sitemap pages, extract article links,
//!   publish unseen ones to the queue.
//! - **Ingest** ([`worker`]): consume one link at a time, fetch and parse the
//!   page, archive the body, persist the record, acknowledge regardless of
//!   outcome.
//! - **Chunk** ([`chunking`]): drain the archived backlog into token-bounded
//!   chunk rows, with an optional embedding provider.
//!
//! Every stage collaborator sits behind a trait ([`queue::WorkQueue`],
//! [`stores::MetadataStore`], [`stores::ContentStore`],
//! [`chunking::Embedder`]), with Postgres and filesystem backends for
//! production and in-memory backends for tests.
//!
//! ## Quick Start
//!
//! ```
//! use newsloom::chunking::ChunkingEngine;
//! use newsloom::config::ChunkBounds;
//!
//! let engine = ChunkingEngine::new(ChunkBounds::default())?;
//! let chunks = engine.chunk("A short report. It ran two sentences.")?;
//! assert_eq!(chunks.len(), 1);
//! # Ok::<(), newsloom::error::PipelineError>(())
//! ```

pub mod chunking;
pub mod config;
pub mod crawler;
pub mod error;
pub mod http;
pub mod queue;
pub mod stores;
pub mod telemetry;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use error::{PipelineError, Result};
