//! HTML article extraction: metadata fields, gates, and body text.
//!
//! A fetched document passes through two gates before any field work: the
//! `<html lang>` attribute must be English (or absent), and the page must
//! declare `og:type` `article`. Pages that fail a gate are terminal recorded
//! outcomes, not errors; the worker logs them and acknowledges the message.
//!
//! Timestamps arrive as separately published date (`yyyymmdd`) and time
//! (`HH:MM`) meta tags; an unparseable pair yields a null timestamp rather
//! than a failure.

use chrono::NaiveDateTime;
use rustc_hash::FxHashMap;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::stores::metadata::ArticleRecord;

/// Why a fetched document was rejected without persisting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// `<html lang>` names a non-English language.
    Language { lang: String },
    /// `og:type` is absent or not `article`.
    ContentType { og_type: Option<String> },
    /// No body paragraphs were found.
    EmptyBody,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Language { lang } => write!(f, "language {lang:?} is not supported"),
            Rejection::ContentType { og_type: Some(t) } => {
                write!(f, "og:type {t:?} is not an article")
            }
            Rejection::ContentType { og_type: None } => write!(f, "page declares no og:type"),
            Rejection::EmptyBody => write!(f, "no body paragraphs"),
        }
    }
}

/// Outcome of extracting one fetched document.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Article(Box<ParsedArticle>),
    Rejected(Rejection),
}

/// Metadata and body text pulled from an article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArticle {
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_site_name: Option<String>,
    pub content_title: Option<String>,
    pub content_vertical: Option<String>,
    pub content_type: Option<String>,
    pub content_tier: Option<String>,
    pub tags: Option<String>,
    pub authors: Option<String>,
    pub display_datetime: Option<NaiveDateTime>,
    pub last_modified_datetime: Option<NaiveDateTime>,
    pub publish_datetime: Option<NaiveDateTime>,
    pub create_datetime: Option<NaiveDateTime>,
    pub body: String,
}

impl ParsedArticle {
    /// Build the metadata row for this article. The archive pointer is
    /// attached by the caller after the upload attempt.
    pub fn into_record(self, page_url: &Url) -> Result<ArticleRecord> {
        let mut record = ArticleRecord::new(page_url.as_str())?;
        record.display_datetime = self.display_datetime;
        record.last_modified_datetime = self.last_modified_datetime;
        record.publish_datetime = self.publish_datetime;
        record.create_datetime = self.create_datetime;
        record.content_vertical = self.content_vertical;
        record.og_description = self.og_description;
        record.content_type = self.content_type;
        record.og_title = self.og_title;
        record.content_title = self.content_title;
        record.og_site_name = self.og_site_name;
        record.tags = self.tags;
        record.authors = self.authors;
        record.content_tier = self.content_tier;
        Ok(record)
    }
}

/// Combine a `yyyymmdd` date string and an `HH:MM` time string into one
/// timestamp. Either side missing or malformed yields `None`.
pub fn combine_date_time(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = date?.trim();
    let time = time?.trim();
    let (year, month, day) = (date.get(0..4)?, date.get(4..6)?, date.get(6..8)?);
    NaiveDateTime::parse_from_str(&format!("{year}-{month}-{day} {time}"), "%Y-%m-%d %H:%M").ok()
}

/// Parses article pages with selectors compiled once up front.
pub struct ArticleExtractor {
    html_selector: Selector,
    meta_selector: Selector,
    paragraph_selector: Selector,
}

impl std::fmt::Debug for ArticleExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArticleExtractor").finish()
    }
}

impl ArticleExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            html_selector: parse_selector("html")?,
            meta_selector: parse_selector("meta")?,
            paragraph_selector: parse_selector("article p")?,
        })
    }

    /// Run the gates and pull every metadata field plus the body text.
    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        if let Some(lang) = document
            .select(&self.html_selector)
            .next()
            .and_then(|element| element.value().attr("lang"))
        {
            if !lang.to_ascii_lowercase().starts_with("en") {
                return Extraction::Rejected(Rejection::Language {
                    lang: lang.to_string(),
                });
            }
        }

        let mut by_name: FxHashMap<String, String> = FxHashMap::default();
        let mut by_property: FxHashMap<String, String> = FxHashMap::default();
        for meta in document.select(&self.meta_selector) {
            let element = meta.value();
            let Some(content) = element.attr("content") else {
                continue;
            };
            if let Some(name) = element.attr("name") {
                by_name
                    .entry(name.to_string())
                    .or_insert_with(|| content.to_string());
            }
            if let Some(property) = element.attr("property") {
                by_property
                    .entry(property.to_string())
                    .or_insert_with(|| content.to_string());
            }
        }

        let og_type = by_property.get("og:type").cloned();
        if og_type.as_deref() != Some("article") {
            return Extraction::Rejected(Rejection::ContentType { og_type });
        }

        let mut paragraphs = Vec::new();
        for paragraph in document.select(&self.paragraph_selector) {
            let text = paragraph.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                paragraphs.push(text.to_string());
            }
        }
        if paragraphs.is_empty() {
            return Extraction::Rejected(Rejection::EmptyBody);
        }

        let pair = |date: &str, time: &str| {
            combine_date_time(
                by_name.get(date).map(String::as_str),
                by_name.get(time).map(String::as_str),
            )
        };

        Extraction::Article(Box::new(ParsedArticle {
            og_title: by_property.get("og:title").cloned(),
            og_description: by_property.get("og:description").cloned(),
            og_site_name: by_property.get("og:site_name").cloned(),
            content_title: by_name.get("content_title").cloned(),
            content_vertical: by_name.get("content_vertical").cloned(),
            content_type: by_name.get("content_type").cloned().or(og_type),
            content_tier: by_name.get("content_tier").cloned(),
            tags: by_name.get("tags").cloned(),
            authors: by_name.get("authors").cloned(),
            display_datetime: pair("display_date", "display_time"),
            last_modified_datetime: pair("last_modified_date", "last_modified_time"),
            publish_datetime: pair("publish_date", "publish_time"),
            create_datetime: pair("create_date", "create_time"),
            body: paragraphs.join("\n"),
        }))
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|err| PipelineError::Html {
        message: format!("selector {selector:?}: {err}"),
    })
}
