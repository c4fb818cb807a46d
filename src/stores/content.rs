//! Gzip blob archive for extracted article text.
//!
//! Blobs are addressed by a date-partitioned key,
//! `{prefix}/{YYYY}/{MM}/{DD}/{content_id}.txt.gz`, where the date comes from
//! the article's publish timestamp (or the current UTC date when the page
//! never published one) and the content id is a hash of the page URL. The
//! same URL therefore always lands on the same key, so a redelivered queue
//! message re-uploads in place instead of duplicating the blob.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use reqwest::Client;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use tracing::instrument;
use url::Url;

use crate::config::{ArchiveBackend, ArchiveSettings, HttpSettings};
use crate::error::{PipelineError, Result};

/// Deterministic content identifier for a page URL: the first 16 hex
/// characters of its SHA-256 digest.
pub fn content_id(page_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page_url.as_bytes());
    let digest = hasher.finalize();
    let mut id = hex::encode(digest);
    id.truncate(16);
    id
}

/// Archive key for a blob: `{prefix}/{YYYY}/{MM}/{DD}/{content_id}.txt.gz`,
/// dated by the publish timestamp when known, the current UTC date otherwise.
pub fn archive_key(prefix: &str, publish: Option<NaiveDateTime>, content_id: &str) -> String {
    let date = publish.unwrap_or_else(|| Utc::now().naive_utc());
    format!("{prefix}/{}/{content_id}.txt.gz", date.format("%Y/%m/%d"))
}

/// Gzip-compress UTF-8 text into blob bytes.
pub fn gzip_text(text: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|err| PipelineError::Archive {
            message: format!("gzip encode: {err}"),
        })?;
    encoder.finish().map_err(|err| PipelineError::Archive {
        message: format!("gzip finish: {err}"),
    })
}

/// Decompress a gzip blob back into UTF-8 text.
pub fn gunzip_text(blob: &[u8]) -> Result<String> {
    let mut decoder = GzDecoder::new(blob);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|err| PipelineError::Archive {
            message: format!("gzip decode: {err}"),
        })?;
    Ok(text)
}

/// Object store for compressed article blobs.
///
/// `put` stores a blob under `key` and returns the locator that the metadata
/// row records; `get` resolves a previously returned locator back to the
/// stored bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<String>;
    async fn get(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Build the content store selected by the archive settings.
pub fn open_content_store(
    archive: &ArchiveSettings,
    http: &HttpSettings,
) -> Result<Arc<dyn ContentStore>> {
    match &archive.backend {
        ArchiveBackend::Filesystem { root } => Ok(Arc::new(FsContentStore::new(root.clone()))),
        ArchiveBackend::Http { endpoint, bucket } => Ok(Arc::new(HttpContentStore::new(
            endpoint.clone(),
            bucket.clone(),
            http,
        )?)),
    }
}

/// Local-directory blob store; the locator is the file path.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    #[instrument(skip(self, blob), err)]
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| PipelineError::Archive {
                    message: format!("create {}: {err}", parent.display()),
                })?;
        }
        tokio::fs::write(&path, &blob)
            .await
            .map_err(|err| PipelineError::Archive {
                message: format!("write {}: {err}", path.display()),
            })?;
        Ok(path.display().to_string())
    }

    #[instrument(skip(self), err)]
    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        tokio::fs::read(locator)
            .await
            .map_err(|err| PipelineError::Archive {
                message: format!("read {locator}: {err}"),
            })
    }
}

/// S3-compatible HTTP object store addressed as `{endpoint}/{bucket}/{key}`;
/// the locator is the full object URL.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: Client,
    endpoint: Url,
    bucket: String,
}

impl HttpContentStore {
    /// Build the store with its own HTTP client. Transport decompression is
    /// disabled on this client: archived blobs must come back byte-for-byte,
    /// and the object store echoes the `gzip` content encoding on reads.
    pub fn new(endpoint: Url, bucket: String, settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .use_rustls_tls()
            .timeout(settings.timeout)
            .no_gzip()
            .no_brotli()
            .build()
            .map_err(|err| PipelineError::Archive {
                message: format!("build archive client: {err}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            bucket,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{key}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.bucket
        )
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    #[instrument(skip(self, blob), err)]
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<String> {
        let target = self.object_url(key);
        let response = self
            .client
            .put(&target)
            .header(CONTENT_TYPE, "text/plain")
            .header(CONTENT_ENCODING, "gzip")
            .body(blob)
            .send()
            .await
            .map_err(|err| PipelineError::Archive {
                message: format!("put {target}: {err}"),
            })?;
        response
            .error_for_status()
            .map_err(|err| PipelineError::Archive {
                message: format!("put {target}: {err}"),
            })?;
        Ok(target)
    }

    #[instrument(skip(self), err)]
    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|err| PipelineError::Archive {
                message: format!("get {locator}: {err}"),
            })?
            .error_for_status()
            .map_err(|err| PipelineError::Archive {
                message: format!("get {locator}: {err}"),
            })?;
        let bytes = response.bytes().await.map_err(|err| PipelineError::Archive {
            message: format!("get {locator}: {err}"),
        })?;
        Ok(bytes.to_vec())
    }
}
