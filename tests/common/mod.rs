//! Shared fixtures and wiring helpers for the cross-component tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use url::Url;

use newsloom::chunking::{EMBEDDING_DIMENSIONS, Embedder};
use newsloom::config::{CrawlSettings, HttpSettings, ThrottleSettings};
use newsloom::error::Result;
use newsloom::http::HttpFetcher;
use newsloom::worker::WorkerSettings;

/// Sitemap index fixture: a navigation block linking to two sitemap pages,
/// plus a footer link the crawler must ignore.
#[allow(dead_code)]
pub const SITEMAP_INDEX_HTML: &str = r#"
    <html lang="en">
    <body>
      <section data-module-name="section">
        <nav role="navigation">
          <a href="/sitemap/2025/1">January</a>
          <a href="/sitemap/2025/2">February</a>
        </nav>
      </section>
      <footer><a href="/about">About</a></footer>
    </body>
    </html>
"#;

/// Builds one sitemap page listing the given article paths.
#[allow(dead_code)]
pub fn sitemap_page_html(paths: &[&str]) -> String {
    let links: String = paths
        .iter()
        .map(|path| format!(r#"<a href="{path}">story</a>"#))
        .collect();
    format!(
        r#"
        <html lang="en">
        <body>
          <section data-module-name="section">
            <div>{links}</div>
          </section>
        </body>
        </html>
        "#
    )
}

/// A complete English article page that passes every parse gate.
#[allow(dead_code)]
pub const ARTICLE_HTML: &str = r#"
    <html lang="en">
    <head>
      <meta property="og:type" content="article">
      <meta property="og:title" content="Markets Rally">
      <meta property="og:site_name" content="Example News">
      <meta name="publish_date" content="20250307">
      <meta name="publish_time" content="09:30">
      <meta name="authors" content="Ada Writer">
    </head>
    <body>
      <article>
        <p>Stocks opened higher on Friday.</p>
        <p>Traders pointed to upbeat quarterly guidance.</p>
      </article>
    </body>
    </html>
"#;

/// A page rejected by the language gate.
#[allow(dead_code)]
pub const GERMAN_HTML: &str = r#"
    <html lang="de">
    <head><meta property="og:type" content="article"></head>
    <body><article><p>Die Kurse stiegen am Freitag.</p></article></body>
    </html>
"#;

/// An article long enough that the chunking engine produces several chunks.
#[allow(dead_code)]
pub fn long_article_html() -> String {
    let paragraphs = [
        "Shares across the exchange opened sharply higher on Friday morning after \
         a week of cautious and uneven trading across every major sector board.",
        "Dealers on the floor said the early burst of buying was driven by overseas \
         desks that had stayed on the sidelines through most of the prior quarter.",
        "The largest industrial names added to their gains before midday while the \
         smaller listings drifted in a narrow band around their opening prices.",
        "Analysts covering the sector pointed to a run of upbeat quarterly guidance \
         from the biggest firms in the index as the main support under the move.",
        "Several strategists cautioned that volumes remained thin by the standards \
         of recent years and that a single large seller could still turn the tape.",
        "Bond desks reported a quiet session with yields holding close to the levels \
         reached after the last round of policy statements from the central bank.",
        "Currency traders described an orderly morning with the major pairs moving \
         inside their recent ranges and little appetite for fresh positions.",
        "By the close the broad index had held most of its early advance and the \
         leaders of the morning finished within sight of their session highs.",
    ];
    let body: String = paragraphs
        .iter()
        .map(|text| format!("<p>{text}</p>"))
        .collect();
    format!(
        r#"
        <html lang="en">
        <head>
          <meta property="og:type" content="article">
          <meta property="og:title" content="A Long Session Report">
        </head>
        <body><article>{body}</article></body>
        </html>
        "#
    )
}

/// Client with retries disabled so failure tests finish fast.
#[allow(dead_code)]
pub fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&HttpSettings {
        retries: 0,
        ..HttpSettings::default()
    })
    .unwrap()
}

/// Crawl settings rooted at the mock server, with delays short enough for
/// tests.
#[allow(dead_code)]
pub fn crawl_settings(root: &str) -> CrawlSettings {
    CrawlSettings {
        sitemap_root: Url::parse(root).unwrap(),
        allowed_hosts: vec!["127.0.0.1".to_string()],
        cycle_delay: Duration::from_millis(5),
    }
}

/// Worker settings that allow the mock server's host and never throttle.
#[allow(dead_code)]
pub fn worker_settings() -> WorkerSettings {
    WorkerSettings {
        allowed_hosts: vec!["127.0.0.1".to_string()],
        archive_prefix: "articles".to_string(),
        poll_interval: Duration::from_millis(5),
        reconnect_delay: Duration::from_millis(5),
        throttle: ThrottleSettings {
            bytes_per_ms: u64::MAX,
            max_delay: Duration::ZERO,
        },
    }
}

/// Deterministic embedding stub: first component records the text length.
#[allow(dead_code)]
pub struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut values = vec![0.0f32; EMBEDDING_DIMENSIONS];
                values[0] = text.len() as f32;
                Vector::from(values)
            })
            .collect())
    }
}

/// Arc helper used by tests that hand the same stub to several components.
#[allow(dead_code)]
pub fn length_embedder() -> Arc<dyn Embedder> {
    Arc::new(LengthEmbedder)
}
