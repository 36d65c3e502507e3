//! Scrape orchestration and the persisted article cache.
//!
//! One call to [`Scraper::scrape_all`] is one run of the pipeline:
//!
//! 1. Load `articles.json` (current or legacy layout; malformed reads as empty).
//! 2. Conditionally fetch the news and research listings. A changed listing is
//!    parsed into fresh candidates; an unchanged or failed one contributes its
//!    cached articles when merging.
//! 3. If neither listing changed, the cached list is returned as-is. Nothing
//!    is filtered, enriched or written.
//! 4. Otherwise candidates are filtered, deduplicated by URL and enriched with
//!    summaries (cached ones first, same-origin pages only).
//! 5. The list is sorted newest first. When merging, cached articles missing
//!    from it are appended back so nothing silently disappears.
//! 6. The result is written back with a fresh timestamp.
//!
//! All requests are awaited one at a time.

use crate::dates::{DateResolver, KeywordBuckets, parse_date};
use crate::enrich::fetch_summary;
use crate::http::{FetchConfig, Fetcher, HttpCache};
use crate::models::{Article, ArticleCache, CacheFile, Source};
use crate::scrapers::news::parse_news_page;
use crate::scrapers::research::parse_research_page;
use crate::scrapers::{SiteConfig, apply_exclusions};
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const ARTICLE_CACHE_FILE: &str = "articles.json";
pub const HTTP_CACHE_FILE: &str = "http_cache.json";

/// Owns the fetcher, the date resolver and the article cache location.
pub struct Scraper<R = StdRng> {
    site: SiteConfig,
    fetcher: Fetcher,
    dates: DateResolver<R>,
    cache_path: PathBuf,
}

impl Scraper<StdRng> {
    /// Scraper for `site` keeping both cache files under `cache_dir`.
    pub async fn new(site: SiteConfig, cache_dir: &Path, buckets: KeywordBuckets) -> Result<Self, Box<dyn Error>> {
        let http_cache = HttpCache::load(&cache_dir.join(HTTP_CACHE_FILE)).await;
        let fetcher = Fetcher::new(http_cache, FetchConfig::default())?;
        Ok(Self::with_parts(
            site,
            fetcher,
            DateResolver::new(buckets),
            cache_dir.join(ARTICLE_CACHE_FILE),
        ))
    }
}

impl<R: Rng> Scraper<R> {
    pub fn with_parts(site: SiteConfig, fetcher: Fetcher, dates: DateResolver<R>, cache_path: PathBuf) -> Self {
        Self {
            site,
            fetcher,
            dates,
            cache_path,
        }
    }

    /// Run the pipeline and return the ordered article list.
    ///
    /// # Arguments
    ///
    /// * `check_modified` - Use conditional requests for listings and article pages
    /// * `merge_with_cache` - Keep cached articles that the fresh scrape did not see
    ///
    /// # Returns
    ///
    /// Articles sorted by date, newest first. Never fails: network and cache
    /// problems degrade to cached or partial results.
    #[instrument(level = "info", skip(self), fields(site = %self.site.name))]
    pub async fn scrape_all(&mut self, check_modified: bool, merge_with_cache: bool) -> Vec<Article> {
        let cache = self.load_article_cache().await;
        let mut candidates = Vec::new();
        let mut any_changed = false;

        for source in [Source::News, Source::Research] {
            let url = self.listing_url(source).clone();
            let outcome = self.fetcher.fetch(url.as_str(), check_modified).await;
            match outcome.content {
                Some(html) if outcome.changed => {
                    any_changed = true;
                    let parsed = match source {
                        Source::News => parse_news_page(&html, &self.site, &mut self.dates),
                        Source::Research => parse_research_page(&html, &self.site, &mut self.dates),
                    };
                    info!(%source, count = parsed.len(), "Listing changed; parsed fresh candidates");
                    candidates.extend(parsed);
                }
                _ if merge_with_cache => {
                    let cached = cache.articles.iter().filter(|a| a.source == source).cloned().collect_vec();
                    info!(%source, count = cached.len(), "Listing unchanged; reusing cached articles");
                    candidates.extend(cached);
                }
                _ => info!(%source, "Listing unchanged; nothing to merge"),
            }
        }

        if !any_changed {
            info!(count = cache.articles.len(), "No listing changed; returning cached articles");
            return cache.articles;
        }

        let candidates = apply_exclusions(candidates)
            .into_iter()
            .unique_by(|a| a.url.clone())
            .collect_vec();
        debug!(count = candidates.len(), "Candidates after exclusion and dedupe");

        let cached_summaries: HashMap<&str, &str> = if merge_with_cache {
            cache
                .articles
                .iter()
                .filter_map(|a| Some((a.url.as_str(), a.summary.as_deref()?)))
                .collect()
        } else {
            HashMap::new()
        };

        let mut articles = Vec::with_capacity(candidates.len());
        let mut enriched = 0usize;
        for mut article in candidates {
            if article.summary.is_none() {
                if let Some(summary) = cached_summaries.get(article.url.as_str()) {
                    article.summary = Some(summary.to_string());
                } else if self.is_same_origin(&article.url) {
                    article.summary = fetch_summary(&mut self.fetcher, &article.url, check_modified).await;
                    enriched += 1;
                }
            }
            articles.push(article);
        }
        info!(count = articles.len(), enriched, "Enrichment complete");

        self.normalize_dates(&mut articles);
        sort_newest_first(&mut articles);

        if merge_with_cache {
            let present: HashSet<&str> = articles.iter().map(|a| a.url.as_str()).collect();
            let mut missing = cache
                .articles
                .iter()
                .filter(|a| !present.contains(a.url.as_str()))
                .cloned()
                .collect_vec();
            if !missing.is_empty() {
                self.normalize_dates(&mut missing);
                info!(count = missing.len(), "Carrying over cached articles absent from this scrape");
                articles.extend(missing);
                sort_newest_first(&mut articles);
            }
        }

        self.save_article_cache(&articles).await;
        articles
    }

    /// Read the article cache as stored. Missing or malformed files yield an
    /// empty cache.
    pub async fn load_article_cache(&self) -> ArticleCache {
        let json = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.cache_path.display(), "No article cache yet");
                return ArticleCache::default();
            }
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "Failed to read article cache");
                return ArticleCache::default();
            }
        };
        match serde_json::from_str::<CacheFile>(&json) {
            Ok(file) => {
                let cache = ArticleCache::from(file);
                info!(count = cache.articles.len(), "Loaded article cache");
                cache
            }
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "Article cache is malformed; treating as empty");
                ArticleCache::default()
            }
        }
    }

    /// Older caches may hold free-text dates; rewrite them in RFC 3339 before
    /// they are written back.
    fn normalize_dates(&self, articles: &mut [Article]) {
        for article in articles.iter_mut() {
            if DateTime::parse_from_rfc3339(&article.date).is_err() {
                let normalized = parse_date(&article.date, self.dates.now());
                debug!(url = %article.url, from = %article.date, to = %normalized, "Normalized cached date");
                article.date = normalized;
            }
        }
    }

    async fn save_article_cache(&self, articles: &[Article]) {
        let cache = ArticleCache {
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            articles: articles.to_vec(),
        };
        let result = match serde_json::to_vec_pretty(&cache) {
            Ok(json) => write_atomic(&self.cache_path, &json).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => info!(path = %self.cache_path.display(), count = articles.len(), "Saved article cache"),
            Err(e) => warn!(path = %self.cache_path.display(), error = %e, "Failed to save article cache"),
        }
    }

    fn listing_url(&self, source: Source) -> &Url {
        match source {
            Source::News => &self.site.news_url,
            Source::Research => &self.site.research_url,
        }
    }

    fn is_same_origin(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|url| self.site.is_same_origin(&url))
    }
}

/// ISO dates with a uniform offset sort correctly as strings.
fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.date.cmp(&a.date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NEWS_PAGE: &str = r#"
      <html><body><main>
        <a href="/news/alpha-launch"><h3>Alpha launch announcement</h3><span>May 2, 2024</span></a>
        <a href="/news/beta-update"><h3>Beta update for everyone</h3><span>Jan 10, 2024</span></a>
      </main></body></html>"#;

    const RESEARCH_PAGE: &str = r#"
      <div class="publication-card">
        <h3>Gamma interpretability paper</h3>
        <a href="https://arxiv.org/abs/2403.01234">Read</a>
      </div>"#;

    fn article_page(text: &str) -> String {
        format!("<html><body><article><p>{text}</p></article></body></html>")
    }

    async fn mount_listings(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"n1\"").set_body_string(NEWS_PAGE))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/research"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"r1\"").set_body_string(RESEARCH_PAGE))
            .mount(server)
            .await;
    }

    async fn mount_article(server: &MockServer, route: &str, text: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_page(text)))
            .expect(times)
            .mount(server)
            .await;
    }

    async fn scraper(server: &MockServer, dir: &TempDir) -> Scraper {
        let site = SiteConfig::for_base_url("Test Lab", &server.uri()).unwrap();
        Scraper::new(site, dir.path(), KeywordBuckets::builtin().unwrap()).await.unwrap()
    }

    fn write_cache(dir: &TempDir, articles: Vec<Article>) {
        let cache = ArticleCache {
            timestamp: 1_700_000_000.0,
            articles,
        };
        std::fs::write(
            dir.path().join(ARTICLE_CACHE_FILE),
            serde_json::to_string(&cache).unwrap(),
        )
        .unwrap();
    }

    fn with_summary(mut article: Article, summary: &str) -> Article {
        article.summary = Some(summary.to_string());
        article
    }

    #[tokio::test]
    async fn test_fresh_scrape_orders_enriches_and_persists() {
        let server = MockServer::start().await;
        mount_listings(&server).await;
        mount_article(&server, "/news/alpha-launch", "Alpha is our newest and most capable release yet.", 1).await;
        mount_article(&server, "/news/beta-update", "Beta brings improvements to every existing plan.", 1).await;

        let dir = TempDir::new().unwrap();
        let mut scraper = scraper(&server, &dir).await;
        let articles = scraper.scrape_all(true, true).await;

        let titles = articles.iter().map(|a| a.title.as_str()).collect_vec();
        assert_eq!(
            titles,
            vec!["Alpha launch announcement", "Gamma interpretability paper", "Beta update for everyone"]
        );
        assert_eq!(articles[0].date, "2024-05-02T12:00:00+00:00");
        assert_eq!(articles[1].date, "2024-03-15T12:00:00+00:00");
        assert_eq!(articles[1].source, Source::Research);
        assert_eq!(
            articles[0].summary.as_deref(),
            Some("Alpha is our newest and most capable release yet.")
        );
        // Off-origin papers are not enriched
        assert!(articles[1].summary.is_none());

        let saved = scraper.load_article_cache().await;
        assert_eq!(saved.articles, articles);
        assert!(saved.timestamp > 0.0);
    }

    #[tokio::test]
    async fn test_unchanged_listings_return_cache_without_enrichment() {
        let server = MockServer::start().await;
        mount_listings(&server).await;
        Mock::given(method("HEAD"))
            .and(path("/news"))
            .and(header("If-None-Match", "\"n1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/research"))
            .and(header("If-None-Match", "\"r1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;
        // Article pages are only fetched by the first run
        mount_article(&server, "/news/alpha-launch", "Alpha is our newest and most capable release yet.", 1).await;
        mount_article(&server, "/news/beta-update", "Beta brings improvements to every existing plan.", 1).await;

        let dir = TempDir::new().unwrap();
        let mut scraper = scraper(&server, &dir).await;
        let first = scraper.scrape_all(true, true).await;
        let saved_before = scraper.load_article_cache().await;

        let second = scraper.scrape_all(true, true).await;
        assert_eq!(first, second);
        // No write on a no-change run
        assert_eq!(scraper.load_article_cache().await, saved_before);
    }

    #[tokio::test]
    async fn test_merge_keeps_cached_articles_and_summaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NEWS_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/research"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_article(&server, "/news/alpha-launch", "unused", 0).await;
        mount_article(&server, "/news/beta-update", "Beta brings improvements to every existing plan.", 1).await;

        let base = server.uri();
        let dir = TempDir::new().unwrap();
        write_cache(
            &dir,
            vec![
                with_summary(
                    Article::new(
                        "Alpha launch announcement",
                        format!("{base}/news/alpha-launch"),
                        "2024-05-02T12:00:00+00:00",
                        Source::News,
                    ),
                    "Cached alpha summary",
                ),
                Article::new(
                    "Gamma interpretability paper",
                    "https://arxiv.org/abs/2403.01234",
                    "2024-03-15T12:00:00+00:00",
                    Source::Research,
                ),
                with_summary(
                    Article::new(
                        "An older post no longer listed",
                        format!("{base}/news/old-post"),
                        "Jan 1, 2023",
                        Source::News,
                    ),
                    "Old summary",
                ),
            ],
        );

        let mut scraper = scraper(&server, &dir).await;
        let articles = scraper.scrape_all(true, true).await;

        let titles = articles.iter().map(|a| a.title.as_str()).collect_vec();
        assert_eq!(
            titles,
            vec![
                "Alpha launch announcement",
                "Gamma interpretability paper",
                "Beta update for everyone",
                "An older post no longer listed",
            ]
        );
        assert_eq!(articles[0].summary.as_deref(), Some("Cached alpha summary"));
        assert_eq!(
            articles[2].summary.as_deref(),
            Some("Beta brings improvements to every existing plan.")
        );
        assert_eq!(articles[3].summary.as_deref(), Some("Old summary"));
        // Free-text dates carried over from the cache are written back normalized
        assert_eq!(articles[3].date, "2023-01-01T12:00:00+00:00");
        assert_eq!(scraper.load_article_cache().await.articles, articles);
    }

    #[tokio::test]
    async fn test_no_merge_drops_articles_missing_from_scrape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NEWS_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/research"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_article(&server, "/news/alpha-launch", "Alpha is our newest and most capable release yet.", 1).await;
        mount_article(&server, "/news/beta-update", "Beta brings improvements to every existing plan.", 1).await;

        let base = server.uri();
        let dir = TempDir::new().unwrap();
        write_cache(
            &dir,
            vec![with_summary(
                Article::new(
                    "An older post no longer listed",
                    format!("{base}/news/old-post"),
                    "2023-01-01T12:00:00+00:00",
                    Source::News,
                ),
                "Old summary",
            )],
        );

        let mut scraper = scraper(&server, &dir).await;
        let articles = scraper.scrape_all(false, false).await;
        assert_eq!(articles.len(), 2);
        assert!(articles.iter().all(|a| !a.url.ends_with("/news/old-post")));
        assert!(articles.iter().all(|a| a.summary.is_some()));
    }

    #[tokio::test]
    async fn test_failed_listings_leave_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let cached = vec![
            Article::new(
                "Cached only article",
                "https://example.com/news/cached",
                "2024-02-02T12:00:00+00:00",
                Source::News,
            ),
            Article::new(
                "Undated cached article",
                "https://example.com/news/undated",
                "coming soon",
                Source::News,
            ),
        ];
        write_cache(&dir, cached.clone());

        let mut scraper = scraper(&server, &dir).await;
        assert_eq!(scraper.scrape_all(true, true).await, cached);
        assert_eq!(scraper.load_article_cache().await.timestamp, 1_700_000_000.0);
    }

    #[tokio::test]
    async fn test_legacy_and_malformed_cache_files() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let scraper = scraper(&server, &dir).await;

        std::fs::write(
            dir.path().join(ARTICLE_CACHE_FILE),
            r#"[{"title":"Legacy","url":"https://example.com/a","date":"March 5, 2024","source":"news"}]"#,
        )
        .unwrap();
        let legacy = scraper.load_article_cache().await;
        assert_eq!(legacy.timestamp, 0.0);
        assert_eq!(legacy.articles[0].title, "Legacy");
        // Dates are left as stored until the cache is rewritten
        assert_eq!(legacy.articles[0].date, "March 5, 2024");

        std::fs::write(dir.path().join(ARTICLE_CACHE_FILE), "{\"articles\": 3}").unwrap();
        assert!(scraper.load_article_cache().await.articles.is_empty());
    }
}
