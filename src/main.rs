//! # llm_news
//!
//! Turns an AI lab's news and research listings into Atom, RSS and JSON
//! feeds. The site publishes no feed of its own, so the pages are scraped,
//! dated, summarized and cached between runs.
//!
//! ## Usage
//!
//! ```sh
//! llm_news -o ./public -c ./data
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: conditional requests against the two listing pages
//!    ([`http`]), so an unchanged site costs two `HEAD` requests
//! 2. **Parsing**: listing markup to candidate articles ([`scrapers`]), each
//!    dated by a cascade of strategies ([`dates`])
//! 3. **Enrichment**: first substantial paragraph of each article page ([`enrich`])
//! 4. **Merging**: reconciliation with the article cache ([`engine`])
//! 5. **Output**: feed files ([`outputs`])

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod dates;
mod engine;
mod enrich;
mod http;
mod models;
mod outputs;
mod scrapers;
mod utils;

use cli::Cli;
use dates::KeywordBuckets;
use engine::Scraper;
use outputs::{FeedMeta, write_feeds};
use scrapers::SiteConfig;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "llm_news starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Fail early on unusable directories
    for dir in [&args.output_dir, &args.cache_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let buckets = match &args.keywords {
        Some(path) => {
            let buckets = KeywordBuckets::load(path).await?;
            info!(path = %path.display(), buckets = buckets.buckets.len(), "Loaded keyword buckets");
            buckets
        }
        None => KeywordBuckets::builtin()?,
    };

    let site = SiteConfig::anthropic()?;
    let meta = FeedMeta::new(&args.feed_url, site.base_url.as_str());
    let mut scraper = Scraper::new(site, &args.cache_dir, buckets).await?;

    info!(
        check_modified = args.check_modified(),
        merge_with_cache = args.merge_with_cache(),
        "Scraping"
    );
    let articles = scraper
        .scrape_all(args.check_modified(), args.merge_with_cache())
        .await;
    info!(count = articles.len(), "Scrape finished");

    if let Err(e) = write_feeds(&articles, &meta, &args.output_dir, Utc::now()).await {
        error!(error = %e, "Failed to write feeds");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        articles = articles.len(),
        "Execution complete"
    );

    Ok(())
}
