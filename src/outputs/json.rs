//! JSON Feed 1.1 rendering.
//!
//! See <https://www.jsonfeed.org/version/1.1/>. Items mirror the Atom
//! entries: the article URL is the id, the HTML body is the same
//! `Source`/summary pair, and the listing source becomes a tag.

use super::{FeedMeta, article_date, entry_html};
use crate::dates::format_iso;
use crate::models::Article;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;

const VERSION: &str = "https://jsonfeed.org/version/1.1";

#[derive(Debug, Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    feed_url: String,
    language: &'a str,
    authors: Vec<Author<'a>>,
    items: Vec<Item<'a>>,
}

#[derive(Debug, Serialize)]
struct Author<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct Item<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    content_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
    date_published: String,
    date_modified: String,
    tags: Vec<&'static str>,
}

/// Render `articles` as a pretty-printed JSON Feed document.
pub fn render(articles: &[Article], meta: &FeedMeta, now: DateTime<Utc>) -> Result<String, Box<dyn Error>> {
    let items = articles
        .iter()
        .map(|article| {
            let date = format_iso(article_date(article, now));
            Item {
                id: &article.url,
                url: &article.url,
                title: &article.title,
                content_html: entry_html(article),
                summary: article.summary.as_deref(),
                date_published: date.clone(),
                date_modified: date,
                tags: vec![article.source.as_str()],
            }
        })
        .collect();

    let feed = JsonFeed {
        version: VERSION,
        title: &meta.title,
        home_page_url: &meta.site_url,
        feed_url: meta.sibling_url("feed.json"),
        language: &meta.language,
        authors: vec![Author { name: &meta.author }],
        items,
    };
    Ok(serde_json::to_string_pretty(&feed)?)
}
