//! News listing parser.
//!
//! Every post on the news index is an anchor pointing under `/news/` that
//! wraps a heading. Dates are rendered inconsistently: inside the anchor,
//! next to it in the parent card, or in a following sibling. They are
//! searched in that order before handing the anchor to the date cascade.

use super::SiteConfig;
use crate::dates::resolve::{find_date_in_text, from_datetime_attribute};
use crate::dates::{DateResolver, format_iso};
use crate::models::{Article, Source};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use rand::Rng;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use url::Url;

/// Following siblings inspected for a date.
const SIBLING_LOOKAHEAD: usize = 4;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4").unwrap());

/// Parse the news listing into candidate articles.
///
/// Anchors without a heading are skipped (they are thumbnails, "read more"
/// links and navigation). The first anchor with a heading wins for each URL.
#[instrument(level = "info", skip_all, fields(bytes = html.len()))]
pub fn parse_news_page<R: Rng>(html: &str, site: &SiteConfig, dates: &mut DateResolver<R>) -> Vec<Article> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for anchor in document.select(&ANCHOR) {
        let Some(url) = anchor.value().attr("href").and_then(|href| site.resolve(href)) else {
            continue;
        };
        if !site.is_news_article(&url) {
            continue;
        }
        let Some(heading) = anchor.select(&HEADING).next() else {
            debug!(%url, "News link without heading; skipping");
            continue;
        };
        let title = collapse_whitespace(&heading.text().collect::<String>());
        if title.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }

        let date = news_date(anchor, &title, &url, dates);
        debug!(%url, %title, %date, "Parsed news candidate");
        articles.push(Article::new(title, url.to_string(), date, Source::News));
    }

    info!(count = articles.len(), "Parsed news listing");
    articles
}

fn news_date<R: Rng>(anchor: ElementRef<'_>, title: &str, url: &Url, dates: &mut DateResolver<R>) -> String {
    let now = dates.now();

    let found = from_datetime_attribute(anchor, now)
        .or_else(|| find_date_in_text(&element_text(anchor), now))
        .or_else(|| {
            let parent = anchor.parent().and_then(ElementRef::wrap)?;
            let text = element_text(parent);
            let after_title = match text.find(title) {
                Some(offset) => &text[offset + title.len()..],
                None => text.as_str(),
            };
            find_date_in_text(after_title, now)
        })
        .or_else(|| {
            anchor
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take(SIBLING_LOOKAHEAD)
                .find_map(|sibling| find_date_in_text(&element_text(sibling), now))
        });

    match found {
        Some(date) => format_iso(date),
        None => dates.extract_date(anchor, Some(url.path())),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}
