//! Command-line interface definitions for llm_news.
//!
//! Every option can also be supplied through an `LLM_NEWS_*` environment
//! variable, which is how the scheduled CI job configures it.

use crate::outputs::DEFAULT_FEED_URL;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the feed generator.
///
/// # Examples
///
/// ```sh
/// # Regenerate feeds in the current directory, caching under ./data
/// llm_news
///
/// # Publish to ./public and ignore all HTTP validators
/// llm_news -o ./public --force-refresh
///
/// # Use a custom keyword table for undated posts
/// llm_news --keywords ./config/date_keywords.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory the feed files are written to
    #[arg(short, long, env = "LLM_NEWS_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Directory holding the HTTP and article caches
    #[arg(short, long, env = "LLM_NEWS_CACHE_DIR", default_value = "data")]
    pub cache_dir: PathBuf,

    /// Fetch every page in full instead of sending conditional requests
    #[arg(long)]
    pub force_refresh: bool,

    /// Publish only what this run scraped, dropping previously cached articles
    #[arg(long)]
    pub no_merge: bool,

    /// YAML file with keyword buckets for estimating undated articles
    #[arg(long, env = "LLM_NEWS_KEYWORDS")]
    pub keywords: Option<PathBuf>,

    /// Public URL of the Atom feed, used for self links
    #[arg(long, env = "LLM_NEWS_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,
}

impl Cli {
    /// Whether requests should carry stored validators.
    pub fn check_modified(&self) -> bool {
        !self.force_refresh
    }

    pub fn merge_with_cache(&self) -> bool {
        !self.no_merge
    }
}
