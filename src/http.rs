//! Conditional HTTP fetching with a persisted validator cache.
//!
//! The [`Fetcher`] remembers, per URL, the `ETag` and `Last-Modified` values
//! of the last full response (see [`CacheEntry`]) and replays them as
//! `If-None-Match` / `If-Modified-Since` on the next run. When a URL has
//! validators, a cheap `HEAD` probe goes out first so an unchanged page costs
//! no body transfer at all.
//!
//! Failures never escape: a timeout, connection error or unexpected status
//! is logged and reported as a [`FetchOutcome`] with no content and no
//! metadata. Callers read "no content" as "no update available".
//!
//! The cache map is written to disk after every mutation, so a crash loses at
//! most the request in flight.

use crate::models::CacheEntry;
use crate::utils::write_atomic;
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, DATE, ETAG, HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::collections::BTreeMap;
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; LLM-News/",
    env!("CARGO_PKG_VERSION"),
    "; +https://github.com/kelp/llm-news)"
);

/// Request timeouts and probing behavior.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub get_timeout: Duration,
    pub head_timeout: Duration,
    /// Send a `HEAD` with validators before a conditional `GET`.
    pub probe_with_head: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            get_timeout: Duration::from_secs(30),
            head_timeout: Duration::from_secs(10),
            probe_with_head: true,
        }
    }
}

/// Result of [`Fetcher::fetch`].
///
/// | content | changed | entry | meaning |
/// |---------|---------|-------|---------|
/// | `Some`  | `true`  | `Some` | new or modified body |
/// | `None`  | `false` | `Some` | server confirmed not modified |
/// | `None`  | `false` | `None` | request failed |
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub content: Option<String>,
    pub changed: bool,
    pub entry: Option<CacheEntry>,
}

impl FetchOutcome {
    fn not_modified(entry: Option<CacheEntry>) -> Self {
        Self {
            content: None,
            changed: false,
            entry,
        }
    }

    fn failed() -> Self {
        Self::default()
    }
}

/// URL -> [`CacheEntry`] map backed by a JSON file.
#[derive(Debug)]
pub struct HttpCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl HttpCache {
    /// Read the cache at `path`. A missing or malformed file yields an empty cache.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let entries = match tokio::fs::read_to_string(path).await {
            Ok(json) => match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&json) {
                Ok(entries) => {
                    info!(count = entries.len(), "Loaded HTTP cache");
                    entries
                }
                Err(e) => {
                    warn!(error = %e, "HTTP cache is malformed; starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No HTTP cache yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read HTTP cache; starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replace the entry for `url` and write the cache through.
    pub async fn insert(&mut self, url: &str, entry: CacheEntry) {
        self.entries.insert(url.to_string(), entry);
        self.persist().await;
    }

    async fn persist(&self) {
        let json = match serde_json::to_vec_pretty(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize HTTP cache");
                return;
            }
        };
        if let Err(e) = write_atomic(&self.path, &json).await {
            warn!(path = %self.path.display(), error = %e, "Failed to persist HTTP cache");
        }
    }
}

/// HTTP client plus the validator cache it maintains.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    cache: HttpCache,
}

impl Fetcher {
    pub fn new(cache: HttpCache, config: FetchConfig) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder().user_agent(config.user_agent.clone()).build()?;
        debug!(cached_urls = cache.len(), user_agent = %config.user_agent, "Fetcher ready");
        Ok(Self { client, config, cache })
    }

    /// Fetch `url`, asking the server to skip the body when `check_modified`
    /// is set and validators from an earlier fetch are on file.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&mut self, url: &str, check_modified: bool) -> FetchOutcome {
        let prior = if check_modified {
            self.cache.get(url).filter(|e| e.has_validators()).cloned()
        } else {
            None
        };

        if let Some(entry) = &prior {
            if self.config.probe_with_head {
                match self.probe(url, entry).await {
                    Ok(true) => {
                        info!("HEAD probe: not modified");
                        return FetchOutcome::not_modified(self.touch(url).await);
                    }
                    Ok(false) => debug!("HEAD probe inconclusive; fetching body"),
                    Err(e) => debug!(error = %e, "HEAD probe failed; fetching body"),
                }
            }
        }

        let t0 = Instant::now();
        let mut request = self.client.get(url).timeout(self.config.get_timeout);
        if let Some(entry) = &prior {
            request = with_validators(request, entry);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                return FetchOutcome::failed();
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Not modified");
            return FetchOutcome::not_modified(self.touch(url).await);
        }
        if !status.is_success() {
            warn!(%status, "Unexpected HTTP status");
            return FetchOutcome::failed();
        }

        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to read response body");
                return FetchOutcome::failed();
            }
        };

        let mut entry = self
            .cache
            .get(url)
            .cloned()
            .unwrap_or_else(|| CacheEntry::new(Utc::now()));
        entry.etag = header_string(&headers, ETAG.as_str());
        entry.last_modified = header_string(&headers, LAST_MODIFIED.as_str());
        entry.server_date = header_string(&headers, DATE.as_str());
        entry.content_length = header_string(&headers, CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok());
        entry.last_checked = Utc::now();
        self.cache.insert(url, entry.clone()).await;

        info!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            etag = ?entry.etag,
            "Fetched"
        );
        FetchOutcome {
            content: Some(body),
            changed: true,
            entry: Some(entry),
        }
    }

    /// Summary extracted from `url` on an earlier run, if any.
    pub fn cached_summary(&self, url: &str) -> Option<&str> {
        self.cache.get(url).and_then(|e| e.content_cache.as_deref())
    }

    pub async fn store_summary(&mut self, url: &str, summary: &str) {
        let mut entry = self
            .cache
            .get(url)
            .cloned()
            .unwrap_or_else(|| CacheEntry::new(Utc::now()));
        entry.content_cache = Some(summary.to_string());
        self.cache.insert(url, entry).await;
    }

    /// `Ok(true)` when the server says the stored validators still hold.
    async fn probe(&self, url: &str, entry: &CacheEntry) -> Result<bool, reqwest::Error> {
        let request = self.client.head(url).timeout(self.config.head_timeout);
        let response = with_validators(request, entry).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(true);
        }
        let same_etag = status.is_success()
            && entry.etag.is_some()
            && header_string(response.headers(), ETAG.as_str()) == entry.etag;
        Ok(same_etag)
    }

    /// Record a not-modified answer: bump `last_checked` and persist.
    async fn touch(&mut self, url: &str) -> Option<CacheEntry> {
        let mut entry = self.cache.get(url).cloned()?;
        entry.last_checked = Utc::now();
        self.cache.insert(url, entry.clone()).await;
        Some(entry)
    }
}

fn with_validators(mut request: RequestBuilder, entry: &CacheEntry) -> RequestBuilder {
    if let Some(etag) = &entry.etag {
        request = request.header(IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = &entry.last_modified {
        request = request.header(IF_MODIFIED_SINCE, last_modified);
    }
    request
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
