//! Article summary extraction.
//!
//! An article's summary is the first substantial paragraph of its page body,
//! ignoring site chrome. Summaries are stored in the HTTP cache next to the
//! page's validators, so an unchanged page is never parsed twice.

use crate::http::Fetcher;
use crate::utils::{collapse_whitespace, truncate_for_log};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

/// Paragraphs longer than this are preferred over shorter ones.
const SUBSTANTIAL_CHARS: usize = 30;

/// Containers whose paragraphs are never a summary.
const CHROME: &[&str] = &["nav", "header", "footer", "aside"];

/// Main-content candidates, most specific first.
static MAIN_REGION: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "article",
        "main",
        "[role='main']",
        ".post-content",
        ".article-content",
        ".entry-content",
        ".content",
        "#content",
    ]
    .iter()
    .map(|css| Selector::parse(css).unwrap())
    .collect()
});
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Summary for the article at `url`, fetched and extracted if needed.
///
/// # Arguments
///
/// * `fetcher` - Fetch layer holding the per-URL cache
/// * `url` - Absolute article URL
/// * `check_modified` - Send conditional requests when validators are known
///
/// # Returns
///
/// The cached summary when the page is unchanged, a freshly extracted one
/// otherwise, or `None` when the page could not be fetched or has no text.
#[instrument(level = "info", skip(fetcher))]
pub async fn fetch_summary(fetcher: &mut Fetcher, url: &str, check_modified: bool) -> Option<String> {
    let mut outcome = fetcher.fetch(url, check_modified).await;

    if !outcome.changed {
        if let Some(summary) = fetcher.cached_summary(url) {
            debug!("Reusing cached summary");
            return Some(summary.to_string());
        }
        if outcome.entry.is_none() {
            return None;
        }
        debug!("Page unchanged but no summary cached; refetching body");
        outcome = fetcher.fetch(url, false).await;
    }

    let body = outcome.content?;
    let Some(summary) = extract_summary(&body) else {
        debug!("No paragraph found");
        return None;
    };
    info!(summary = %truncate_for_log(&summary, 80), "Extracted summary");
    fetcher.store_summary(url, &summary).await;
    Some(summary)
}

/// First paragraph longer than 30 characters in the page's main region,
/// else its first non-empty paragraph.
pub fn extract_summary(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let region = MAIN_REGION
        .iter()
        .find_map(|selector| document.select(selector).next())
        .unwrap_or_else(|| document.root_element());

    let paragraphs: Vec<String> = region
        .select(&PARAGRAPH)
        .filter(|p| !in_chrome(*p))
        .map(|p| collapse_whitespace(&p.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
        .collect();

    paragraphs
        .iter()
        .find(|text| text.chars().count() > SUBSTANTIAL_CHARS)
        .or_else(|| paragraphs.first())
        .cloned()
}

fn in_chrome(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| CHROME.contains(&ancestor.value().name()))
}
