//! Feed generation for Atom, RSS and JSON Feed readers.
//!
//! # Submodules
//!
//! - [`atom`]: Atom 1.0 document (also published as `feed.xml` for browsers)
//! - [`rss`]: RSS 2.0 document
//! - [`json`]: JSON Feed 1.1 document
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── feed.atom
//! ├── feed.xml          # same bytes as feed.atom
//! ├── feed.rss
//! ├── feed.json
//! └── last_update.txt   # "Last updated: <RFC 3339 timestamp>"
//! ```

pub mod atom;
pub mod json;
pub mod rss;

use crate::dates::format_iso;
use crate::models::Article;
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::error::Error;
use std::io::Write;
use std::path::Path;
use tracing::{info, instrument, warn};
use url::Url;

pub const DEFAULT_FEED_URL: &str = "https://kelp.github.io/llm-news/feed.atom";

/// Channel-level metadata shared by every feed format.
#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Public URL of `feed.atom`; the other formats are published next to it.
    pub feed_url: String,
    /// Home page of the site the articles come from.
    pub site_url: String,
    pub language: String,
}

impl FeedMeta {
    pub fn new(feed_url: &str, site_url: &str) -> Self {
        Self {
            id: "anthropic-feed".to_string(),
            title: "Anthropic News and Research".to_string(),
            author: "Anthropic Feed Generator".to_string(),
            feed_url: feed_url.to_string(),
            site_url: site_url.to_string(),
            language: "en".to_string(),
        }
    }

    /// URL of `file_name` published alongside the Atom feed.
    pub fn sibling_url(&self, file_name: &str) -> String {
        Url::parse(&self.feed_url)
            .and_then(|url| url.join(file_name))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| file_name.to_string())
    }
}

/// Parsed publication date of `article`, or `now` when the stored string is unusable.
pub(crate) fn article_date(article: &Article, now: DateTime<Utc>) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(&article.date) {
        Ok(date) => date.with_timezone(&Utc),
        Err(e) => {
            warn!(url = %article.url, date = %article.date, error = %e, "Unparseable article date; using now");
            now
        }
    }
}

/// HTML body shared by the Atom and JSON entries.
pub(crate) fn entry_html(article: &Article) -> String {
    let mut html = format!("<p>Source: {}</p>", article.source);
    if let Some(summary) = &article.summary {
        html.push_str(&format!("<p>{}</p>", quick_xml::escape::escape(summary.as_str())));
    }
    html
}

pub(crate) fn write_text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<(), Box<dyn Error>> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render every format and write them to `output_dir`.
///
/// # Arguments
///
/// * `articles` - Ordered article list, newest first
/// * `meta` - Channel metadata
/// * `output_dir` - Destination directory (must exist)
/// * `now` - Feed `updated` time and the `last_update.txt` stamp
///
/// # Returns
///
/// `Ok(())` once all five files are written, or the first rendering or I/O error.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = articles.len()))]
pub async fn write_feeds(
    articles: &[Article],
    meta: &FeedMeta,
    output_dir: &Path,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn Error>> {
    let atom = atom::render(articles, meta, now)?;
    let rss = rss::render(articles, meta, now)?;
    let json = json::render(articles, meta, now)?;
    let stamp = format!("Last updated: {}\n", format_iso(now));

    let files = [
        ("feed.atom", atom.as_bytes()),
        ("feed.xml", atom.as_bytes()),
        ("feed.rss", rss.as_bytes()),
        ("feed.json", json.as_bytes()),
        ("last_update.txt", stamp.as_bytes()),
    ];
    let paths = files.iter().map(|(name, _)| output_dir.join(name)).collect::<Vec<_>>();
    try_join_all(
        paths
            .iter()
            .zip(files.iter())
            .map(|(path, (_, bytes))| write_atomic(path, bytes)),
    )
    .await?;

    for path in &paths {
        info!(path = %path.display(), "Wrote feed file");
    }
    Ok(())
}
