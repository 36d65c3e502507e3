//! Research listing parser.
//!
//! The research page has changed layout several times, so candidates are
//! collected in layers:
//!
//! 1. Structural cards whose class mentions `publication`, `research` or `paper`.
//! 2. If there are none, any element whose id or class mentions those words.
//! 3. Always: links to paper hosts (arXiv, Transformer Circuits) and PDFs.
//!
//! Paper links often carry text like "Read paper", so titles for layer 3 are
//! recovered from surrounding headings, nearby text, or the URL itself.

use super::SiteConfig;
use crate::dates::{DateResolver, at_noon, format_iso};
use crate::models::{Article, Source};
use crate::utils::{collapse_whitespace, title_from_slug};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use url::Url;

/// Ancestor levels searched for a better title.
const TITLE_SEARCH_DEPTH: usize = 3;
const GENERIC_LINK_TEXT: &[&str] = &["read paper", "pdf", "arxiv", "link", "read more"];

static CARD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "div[class*='publication'], div[class*='research'], div[class*='paper'], \
         article[class*='publication'], article[class*='research'], article[class*='paper'], \
         li[class*='publication'], li[class*='research'], li[class*='paper']",
    )
    .unwrap()
});
static BROAD_CARD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "[id*='publication'], [class*='publication'], [id*='paper'], [class*='paper'], [id*='research']",
    )
    .unwrap()
});
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4, strong, b").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static NEARBY_HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h2, h3, h4").unwrap());

/// `YYMM.NNNNN` arXiv identifiers, with the month constrained to 01-12.
static ARXIV_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[/:])((\d{2})(0[1-9]|1[0-2])\.\d{4,5})(?:v\d+)?").unwrap());

/// Parse the research listing into candidate articles.
#[instrument(level = "info", skip_all, fields(bytes = html.len()))]
pub fn parse_research_page<R: Rng>(html: &str, site: &SiteConfig, dates: &mut DateResolver<R>) -> Vec<Article> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    let mut cards: Vec<ElementRef> = document.select(&CARD).collect();
    if cards.is_empty() {
        cards = document.select(&BROAD_CARD).collect();
        debug!(count = cards.len(), "No publication cards; using broad attribute search");
    }

    for card in cards {
        let (Some(title_el), Some(link)) = (card.select(&CARD_TITLE).next(), card.select(&LINK).next()) else {
            continue;
        };
        let title = collapse_whitespace(&title_el.text().collect::<String>());
        let Some(url) = link.value().attr("href").and_then(|href| site.resolve(href)) else {
            continue;
        };
        if title.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        let date = match preprint_date(&url) {
            Some(date) => format_iso(date),
            None => dates.extract_date(card, Some(url.path())),
        };
        articles.push(Article::new(title, url.to_string(), date, Source::Research));
    }
    let from_cards = articles.len();

    for link in document.select(&LINK) {
        let Some(url) = link.value().attr("href").and_then(|href| site.resolve(href)) else {
            continue;
        };
        if !site.is_research_link(&url) || seen.contains(url.as_str()) {
            continue;
        }
        let title = link_title(link, &url, site);
        if title.is_empty() {
            continue;
        }
        let date = match preprint_date(&url) {
            Some(date) => format_iso(date),
            None => {
                let context = link.parent().and_then(ElementRef::wrap).unwrap_or(link);
                dates.extract_date(context, Some(url.path()))
            }
        };
        seen.insert(url.to_string());
        articles.push(Article::new(title, url.to_string(), date, Source::Research));
    }

    info!(
        count = articles.len(),
        from_cards,
        from_links = articles.len() - from_cards,
        "Parsed research listing"
    );
    articles
}

/// Submission month of an arXiv link, as the 15th of that month at noon UTC.
pub fn preprint_date(url: &Url) -> Option<DateTime<Utc>> {
    if !url.host_str()?.ends_with("arxiv.org") {
        return None;
    }
    let caps = ARXIV_ID.captures(url.path())?;
    let year = 2000 + caps[2].parse::<i32>().ok()?;
    let month: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 15).map(at_noon)
}

fn arxiv_id(url: &Url) -> Option<String> {
    ARXIV_ID.captures(url.path()).map(|caps| caps[1].to_string())
}

fn is_weak_title(text: &str) -> bool {
    text.is_empty() || text.chars().count() < 15 || GENERIC_LINK_TEXT.contains(&text.to_lowercase().as_str())
}

/// Best available title for a bare paper link.
fn link_title(link: ElementRef<'_>, url: &Url, site: &SiteConfig) -> String {
    let mut title = collapse_whitespace(&link.text().collect::<String>());
    if !is_weak_title(&title) {
        return title;
    }

    for ancestor in link.ancestors().filter_map(ElementRef::wrap).take(TITLE_SEARCH_DEPTH) {
        if let Some(heading) = ancestor.select(&NEARBY_HEADING).next() {
            let text = collapse_whitespace(&heading.text().collect::<String>());
            if !text.is_empty() {
                title = text;
                break;
            }
        }
        let block = collapse_whitespace(&ancestor.text().collect::<Vec<_>>().join(" "));
        let len = block.chars().count();
        if len > 20 && len < 200 {
            title = block;
            break;
        }
    }

    if title.chars().count() < 10 {
        title = synthesize_title(url, site);
    }
    title
}

fn synthesize_title(url: &Url, site: &SiteConfig) -> String {
    if url.host_str().is_some_and(|h| h.ends_with("arxiv.org")) {
        if let Some(id) = arxiv_id(url) {
            return format!("{} Research Paper (arXiv:{id})", site.name);
        }
    }
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .and_then(title_from_slug)
        .map(|t| format!("{} Research: {t}", site.name))
        .unwrap_or_else(|| format!("{} Research Paper", site.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::KeywordBuckets;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn site() -> SiteConfig {
        SiteConfig::anthropic().unwrap()
    }

    fn resolver() -> DateResolver<StdRng> {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 8, 30, 0).unwrap();
        DateResolver::with_rng(KeywordBuckets::builtin().unwrap(), now, StdRng::seed_from_u64(5))
    }

    #[test]
    fn test_publication_cards() {
        let html = r#"
          <div class="publication-card">
            <h3>Scaling Monosemanticity</h3>
            <time datetime="2024-05-21">May 21, 2024</time>
            <a href="/research/scaling-monosemanticity">Read</a>
          </div>
          <div class="publication-card">
            <h3>Many-shot jailbreaking</h3>
            <span class="date">Apr 2, 2024</span>
            <a href="/research/many-shot-jailbreaking">Read</a>
          </div>"#;

        let articles = parse_research_page(html, &site(), &mut resolver());
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Scaling Monosemanticity");
        assert_eq!(articles[0].url, "https://www.anthropic.com/research/scaling-monosemanticity");
        assert_eq!(articles[0].date, "2024-05-21T12:00:00+00:00");
        assert_eq!(articles[0].source, Source::Research);
        assert_eq!(articles[1].date, "2024-04-02T12:00:00+00:00");
    }

    #[test]
    fn test_broad_search_when_no_cards() {
        let html = r#"
          <section id="papers-list">
            <strong>Constitutional AI: Harmlessness from AI Feedback</strong>
            <a href="/research/constitutional-ai">Read more</a>
            <p>Dec 15, 2022</p>
          </section>"#;

        let articles = parse_research_page(html, &site(), &mut resolver());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Constitutional AI: Harmlessness from AI Feedback");
        assert_eq!(articles[0].date, "2022-12-15T12:00:00+00:00");
    }

    #[test]
    fn test_arxiv_links_get_titles_and_preprint_dates() {
        let html = r#"
          <ul>
            <li><h4>Sleeper Agents: Training Deceptive LLMs</h4><a href="https://arxiv.org/abs/2401.05566">arXiv</a></li>
          </ul>
          <div><div><p><a href="https://arxiv.org/pdf/2212.08073v1">PDF</a></p></div></div>"#;

        let articles = parse_research_page(html, &site(), &mut resolver());
        assert_eq!(articles.len(), 2);

        assert_eq!(articles[0].title, "Sleeper Agents: Training Deceptive LLMs");
        assert_eq!(articles[0].date, "2024-01-15T12:00:00+00:00");

        assert_eq!(articles[1].title, "Anthropic Research Paper (arXiv:2212.08073)");
        assert_eq!(articles[1].date, "2022-12-15T12:00:00+00:00");
    }

    #[test]
    fn test_pdf_link_title_from_slug() {
        let html = r#"<p><a href="https://cdn.example.com/files/model_card.pdf">PDF</a></p>"#;
        let articles = parse_research_page(html, &site(), &mut resolver());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Anthropic Research: Model Card");
    }

    #[test]
    fn test_long_link_text_is_kept_and_duplicates_dropped() {
        let html = r#"
          <div class="paper-item">
            <h3>Discovering Language Model Behaviors</h3>
            <a href="https://arxiv.org/abs/2212.09251">Discovering Language Model Behaviors with Model-Written Evaluations</a>
          </div>
          <a href="https://arxiv.org/abs/2212.09251">Discovering Language Model Behaviors with Model-Written Evaluations</a>"#;

        let articles = parse_research_page(html, &site(), &mut resolver());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Discovering Language Model Behaviors");
        assert_eq!(articles[0].date, "2022-12-15T12:00:00+00:00");
    }

    #[test]
    fn test_preprint_date_requires_arxiv_host_and_valid_month() {
        assert!(preprint_date(&Url::parse("https://example.com/abs/2401.05566").unwrap()).is_none());
        assert!(preprint_date(&Url::parse("https://arxiv.org/abs/2413.05566").unwrap()).is_none());
        let date = preprint_date(&Url::parse("https://arxiv.org/abs/2310.13548v2").unwrap()).unwrap();
        assert_eq!(format_iso(date), "2023-10-15T12:00:00+00:00");
    }
}
