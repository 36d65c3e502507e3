//! Data models shared by the scraper, the cache engine and the feed writers.
//!
//! - [`Article`]: one news post or research paper as it appears in the feeds
//! - [`Source`]: which listing page an article was discovered on
//! - [`CacheEntry`]: per-URL HTTP caching metadata kept by the fetch layer
//! - [`ArticleCache`]: the persisted article list, with [`CacheFile`] accepting
//!   both the current and the legacy on-disk layouts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The listing page an article came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    News,
    Research,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::News => "news",
            Source::Research => "research",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single article as emitted to the feed writers.
///
/// `url` is the identity of an article: two records with the same URL are the
/// same article, both within one scrape and across runs. `date` is always a
/// normalized RFC 3339 timestamp carrying an explicit offset, so that plain
/// string comparison orders articles chronologically.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    /// Headline as shown on the listing page.
    pub title: String,
    /// Absolute URL of the article.
    pub url: String,
    /// Publication date, e.g. `2024-01-01T12:00:00+00:00`.
    pub date: String,
    /// Listing page the article was found on.
    pub source: Source,
    /// First substantial paragraph of the article page, when one was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Article {
    pub fn new(title: impl Into<String>, url: impl Into<String>, date: impl Into<String>, source: Source) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            date: date.into(),
            source,
            summary: None,
        }
    }
}

/// Conditional-request metadata remembered for one URL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub etag: Option<String>,
    /// Raw `Last-Modified` header value, replayed as `If-Modified-Since`.
    #[serde(default)]
    pub last_modified: Option<String>,
    pub last_checked: DateTime<Utc>,
    /// Summary extracted from the page the last time its body was parsed.
    #[serde(default)]
    pub content_cache: Option<String>,
    /// Raw `Date` header of the last full response.
    #[serde(default)]
    pub server_date: Option<String>,
    #[serde(default)]
    pub content_length: Option<u64>,
}

impl CacheEntry {
    pub fn new(last_checked: DateTime<Utc>) -> Self {
        Self {
            etag: None,
            last_modified: None,
            last_checked,
            content_cache: None,
            server_date: None,
            content_length: None,
        }
    }

    /// Whether the entry holds anything a server can validate against.
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// The article list as persisted between runs.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ArticleCache {
    /// Seconds since the Unix epoch at which the cache was written.
    pub timestamp: f64,
    pub articles: Vec<Article>,
}

/// Every layout the article cache file has had on disk.
///
/// Older releases wrote a bare JSON array of articles; current releases wrap
/// it with a write timestamp. Reads accept both, writes always produce
/// [`ArticleCache`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CacheFile {
    Timestamped(ArticleCache),
    Legacy(Vec<Article>),
}

impl From<CacheFile> for ArticleCache {
    fn from(file: CacheFile) -> Self {
        match file {
            CacheFile::Timestamped(cache) => cache,
            CacheFile::Legacy(articles) => ArticleCache {
                timestamp: 0.0,
                articles,
            },
        }
    }
}
