//! Listing page parsers.
//!
//! The site publishes two listing pages, each parsed into candidate
//! [`Article`]s by its own module:
//!
//! | Page | Module | Strategy |
//! |------|--------|----------|
//! | News | [`news`] | anchors under the news path with a heading inside |
//! | Research | [`research`] | publication cards, then links to paper hosts and PDFs |
//!
//! Both parsers key candidates by resolved absolute URL and keep the first
//! occurrence. Neither does any I/O; fetching is the engine's job.
//!
//! After parsing, [`apply_exclusions`] drops navigation noise (legal pages,
//! login links, empty titles) before anything is enriched.

pub mod news;
pub mod research;

use crate::models::Article;
use std::error::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.anthropic.com";

/// URL fragments that mark a link as site chrome rather than content.
const EXCLUDED_URL_PARTS: &[&str] = &[
    "privacy", "terms", "legal", "contact", "login", "logout", "signin", "sign-in", "signup", "sign-up",
    "/auth", "oauth",
];

/// Titles shorter than this (in characters) are noise.
const MIN_TITLE_CHARS: usize = 5;

/// Everything the parsers and the engine need to know about the target site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Display name used in synthesized titles.
    pub name: String,
    pub base_url: Url,
    pub news_url: Url,
    pub research_url: Url,
    /// Path prefix of individual news posts.
    pub news_path_prefix: String,
    /// Hosts whose links on the research page are papers.
    pub research_hosts: Vec<String>,
}

impl SiteConfig {
    /// Site layout rooted at `base_url`: `/news`, `/research`, posts under `/news/`.
    pub fn for_base_url(name: &str, base_url: &str) -> Result<Self, Box<dyn Error>> {
        let base_url = Url::parse(base_url)?;
        Ok(Self {
            name: name.to_string(),
            news_url: base_url.join("/news")?,
            research_url: base_url.join("/research")?,
            base_url,
            news_path_prefix: "/news/".to_string(),
            research_hosts: vec!["arxiv.org".to_string(), "transformer-circuits.pub".to_string()],
        })
    }

    pub fn anthropic() -> Result<Self, Box<dyn Error>> {
        Self::for_base_url("Anthropic", DEFAULT_BASE_URL)
    }

    /// Resolve an `href` against the site root, keeping only http(s) targets.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let mut url = self.base_url.join(href).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        url.set_fragment(None);
        Some(url)
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base_url.origin()
    }

    /// An individual post under the news section, not the section index.
    pub fn is_news_article(&self, url: &Url) -> bool {
        let path = url.path();
        self.is_same_origin(url) && path.starts_with(&self.news_path_prefix) && path.len() > self.news_path_prefix.len()
    }

    /// A link to a known paper host, or to a PDF anywhere.
    pub fn is_research_link(&self, url: &Url) -> bool {
        let on_research_host = url.host_str().is_some_and(|host| {
            self.research_hosts
                .iter()
                .any(|h| host == h || host.ends_with(&format!(".{h}")))
        });
        on_research_host || url.path().to_ascii_lowercase().ends_with(".pdf")
    }
}

/// Whether an article should be dropped before enrichment.
pub fn is_excluded(article: &Article) -> bool {
    let url = article.url.to_lowercase();
    EXCLUDED_URL_PARTS.iter().any(|part| url.contains(part)) || article.title.trim().chars().count() < MIN_TITLE_CHARS
}

/// Drop legal, contact and auth links and articles without a usable title.
pub fn apply_exclusions(articles: Vec<Article>) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|article| {
            let excluded = is_excluded(article);
            if excluded {
                debug!(url = %article.url, title = %article.title, "Excluding candidate");
            }
            !excluded
        })
        .collect()
}
