//! Environment-driven settings for the pipeline binaries.
//!
//! Every knob has a documented default except the database URL, which is the
//! single fatal startup requirement. A `.env` file is honored when present.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{PipelineError, Result};

/// Top-level settings, grouped by concern. Each binary consumes only the
/// groups it needs.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Postgres connection string (`NEWSLOOM_DATABASE_URL`, falling back to
    /// `DATABASE_URL`). Required.
    pub database_url: String,
    pub queue: QueueSettings,
    pub crawl: CrawlSettings,
    pub http: HttpSettings,
    pub archive: ArchiveSettings,
    pub chunking: ChunkBounds,
    pub throttle: ThrottleSettings,
}

impl Settings {
    /// Load settings from the process environment (and `.env` when present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("NEWSLOOM_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| {
                PipelineError::Config(
                    "NEWSLOOM_DATABASE_URL (or DATABASE_URL) must be set".to_string(),
                )
            })?;

        Ok(Self {
            database_url,
            queue: QueueSettings::from_env(),
            crawl: CrawlSettings::from_env()?,
            http: HttpSettings::from_env(),
            archive: ArchiveSettings::from_env()?,
            chunking: ChunkBounds::from_env()?,
            throttle: ThrottleSettings::from_env(),
        })
    }
}

/// Durable work-queue knobs.
#[derive(Clone, Debug)]
pub struct QueueSettings {
    /// Queue name; one named channel carries all sitemap links.
    pub name: String,
    /// Consumer poll interval when the queue is empty.
    pub poll_interval: Duration,
    /// Fixed delay between reconnect attempts after a broker failure.
    pub reconnect_delay: Duration,
    /// Lease held on a delivered message; an un-acked delivery becomes
    /// claimable again once the lease expires.
    pub lease: Duration,
}

impl QueueSettings {
    pub const DEFAULT_NAME: &'static str = "sitemap_links";

    fn from_env() -> Self {
        Self {
            name: env_or("NEWSLOOM_QUEUE", Self::DEFAULT_NAME),
            poll_interval: Duration::from_millis(env_u64("NEWSLOOM_QUEUE_POLL_MS", 500)),
            reconnect_delay: Duration::from_secs(env_u64("NEWSLOOM_RECONNECT_SECS", 5)),
            lease: Duration::from_secs(env_u64("NEWSLOOM_LEASE_SECS", 300)),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            poll_interval: Duration::from_millis(500),
            reconnect_delay: Duration::from_secs(5),
            lease: Duration::from_secs(300),
        }
    }
}

/// Producer-side crawl knobs.
#[derive(Clone, Debug)]
pub struct CrawlSettings {
    /// Root sitemap index the crawler walks each cycle.
    pub sitemap_root: Url,
    /// Hosts the worker is allowed to fetch articles from. Defaults to the
    /// sitemap root's host.
    pub allowed_hosts: Vec<String>,
    /// Sleep between crawl cycles.
    pub cycle_delay: Duration,
}

impl CrawlSettings {
    fn from_env() -> Result<Self> {
        let root = env_or("NEWSLOOM_SITEMAP_ROOT", "https://www.example.com/sitemap");
        let sitemap_root = Url::parse(&root)
            .map_err(|err| PipelineError::Config(format!("NEWSLOOM_SITEMAP_ROOT: {err}")))?;

        let allowed_hosts = match std::env::var("NEWSLOOM_ALLOWED_HOSTS") {
            Ok(raw) => parse_host_list(&raw),
            Err(_) => sitemap_root
                .host_str()
                .map(|h| vec![h.to_string()])
                .unwrap_or_default(),
        };
        if allowed_hosts.is_empty() {
            return Err(PipelineError::Config(
                "NEWSLOOM_ALLOWED_HOSTS resolved to an empty allow-list".to_string(),
            ));
        }

        Ok(Self {
            sitemap_root,
            allowed_hosts,
            cycle_delay: Duration::from_secs(env_u64("NEWSLOOM_CRAWL_DELAY_SECS", 60)),
        })
    }
}

/// Shared HTTP client policy: bounded per-request timeout plus a fixed-count
/// linear-backoff retry on transport errors and 5xx responses.
#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Backoff grows linearly: `attempt * backoff_step`.
    pub backoff_step: Duration,
}

impl HttpSettings {
    pub const DEFAULT_USER_AGENT: &'static str = "Mozilla/5.0 (compatible; newsloom/0.1)";

    fn from_env() -> Self {
        Self {
            user_agent: env_or("NEWSLOOM_USER_AGENT", Self::DEFAULT_USER_AGENT),
            timeout: Duration::from_secs(env_u64("NEWSLOOM_HTTP_TIMEOUT_SECS", 20)),
            retries: env_u64("NEWSLOOM_HTTP_RETRIES", 3) as u32,
            backoff_step: Duration::from_secs(env_u64("NEWSLOOM_HTTP_BACKOFF_SECS", 2)),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: Self::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(20),
            retries: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

/// Where archived article text lives.
#[derive(Clone, Debug)]
pub enum ArchiveBackend {
    /// Local directory tree; development and test default.
    Filesystem { root: PathBuf },
    /// S3-compatible HTTP object store addressed as `{endpoint}/{bucket}/{key}`.
    Http { endpoint: Url, bucket: String },
}

#[derive(Clone, Debug)]
pub struct ArchiveSettings {
    pub backend: ArchiveBackend,
    /// First path segment of every archive key.
    pub prefix: String,
}

impl ArchiveSettings {
    fn from_env() -> Result<Self> {
        let backend = match std::env::var("NEWSLOOM_ARCHIVE_ENDPOINT") {
            Ok(raw) => {
                let endpoint = Url::parse(&raw).map_err(|err| {
                    PipelineError::Config(format!("NEWSLOOM_ARCHIVE_ENDPOINT: {err}"))
                })?;
                ArchiveBackend::Http {
                    endpoint,
                    bucket: env_or("NEWSLOOM_ARCHIVE_BUCKET", "articles"),
                }
            }
            Err(_) => ArchiveBackend::Filesystem {
                root: PathBuf::from(env_or("NEWSLOOM_ARCHIVE_ROOT", "./archive")),
            },
        };
        Ok(Self {
            backend,
            prefix: env_or("NEWSLOOM_ARCHIVE_PREFIX", "articles"),
        })
    }
}

/// Token bounds for the chunking engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkBounds {
    pub lower: usize,
    pub upper: usize,
}

impl ChunkBounds {
    pub const DEFAULT_LOWER: usize = 50;
    pub const DEFAULT_UPPER: usize = 200;

    pub fn new(lower: usize, upper: usize) -> Result<Self> {
        if lower == 0 || lower >= upper {
            return Err(PipelineError::Config(format!(
                "chunk bounds must satisfy 0 < lower < upper, got {lower}/{upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    fn from_env() -> Result<Self> {
        Self::new(
            env_u64("NEWSLOOM_CHUNK_LOWER", Self::DEFAULT_LOWER as u64) as usize,
            env_u64("NEWSLOOM_CHUNK_UPPER", Self::DEFAULT_UPPER as u64) as usize,
        )
    }
}

impl Default for ChunkBounds {
    fn default() -> Self {
        Self {
            lower: Self::DEFAULT_LOWER,
            upper: Self::DEFAULT_UPPER,
        }
    }
}

/// Outbound politeness delay applied by the worker after each fetched page,
/// proportional to body length and bounded above.
#[derive(Clone, Copy, Debug)]
pub struct ThrottleSettings {
    /// Body bytes per millisecond of delay.
    pub bytes_per_ms: u64,
    pub max_delay: Duration,
}

impl ThrottleSettings {
    fn from_env() -> Self {
        Self {
            bytes_per_ms: env_u64("NEWSLOOM_THROTTLE_BYTES_PER_MS", 1024).max(1),
            max_delay: Duration::from_millis(env_u64("NEWSLOOM_THROTTLE_MAX_MS", 5000)),
        }
    }

    /// Delay for a fetched body of `body_len` bytes.
    pub fn delay_for(&self, body_len: usize) -> Duration {
        let millis = (body_len as u64) / self.bytes_per_ms;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            bytes_per_ms: 1024,
            max_delay: Duration::from_millis(5000),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_list_splits_and_normalizes() {
        let hosts = parse_host_list(" Example.com, news.example.com ,,");
        assert_eq!(hosts, vec!["example.com", "news.example.com"]);
    }

    #[test]
    fn chunk_bounds_reject_inverted_range() {
        assert!(ChunkBounds::new(200, 50).is_err());
        assert!(ChunkBounds::new(0, 50).is_err());
        assert!(ChunkBounds::new(50, 200).is_ok());
    }

    #[test]
    fn throttle_delay_is_proportional_and_bounded() {
        let throttle = ThrottleSettings {
            bytes_per_ms: 1024,
            max_delay: Duration::from_millis(5000),
        };
        assert_eq!(throttle.delay_for(0), Duration::from_millis(0));
        assert_eq!(throttle.delay_for(10 * 1024), Duration::from_millis(10));
        assert_eq!(throttle.delay_for(100 * 1024 * 1024), throttle.max_delay);
    }
}
