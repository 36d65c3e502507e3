//! Keyword-driven date estimation.
//!
//! When a candidate carries no date at all, the URL path is matched against
//! ordered keyword buckets (product names, launch slugs) that map to an age
//! window, and a day is drawn uniformly inside that window. The result is not
//! ground truth; it only keeps undated posts in a roughly sensible place in a
//! chronologically sorted feed.
//!
//! Buckets are data, loaded from YAML. The built-in set lives in
//! `config/date_keywords.yaml`.

use super::{at_noon, days_ago};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tracing::{debug, info, instrument};

const BUILTIN_KEYWORDS_YAML: &str = include_str!("../../config/date_keywords.yaml");

/// Upper bound on any configured age, about a century.
const MAX_CONFIGURED_DAYS: i64 = 36_500;

/// An age window, in whole days before now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DayRange {
    pub min_days: i64,
    pub max_days: i64,
}

impl Default for DayRange {
    fn default() -> Self {
        Self {
            min_days: 30,
            max_days: 730,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeywordBucket {
    pub name: String,
    pub min_days: i64,
    pub max_days: i64,
    pub keywords: Vec<String>,
}

impl KeywordBucket {
    pub fn range(&self) -> DayRange {
        DayRange {
            min_days: self.min_days,
            max_days: self.max_days,
        }
    }

    fn matches(&self, lowered_path: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| lowered_path.contains(&k.to_lowercase()))
    }
}

/// The ordered bucket list plus the window used when nothing matches.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeywordBuckets {
    pub buckets: Vec<KeywordBucket>,
    #[serde(default)]
    pub fallback: DayRange,
}

impl KeywordBuckets {
    /// The bucket set shipped with the binary.
    pub fn builtin() -> Result<Self, Box<dyn Error>> {
        Self::from_yaml(BUILTIN_KEYWORDS_YAML)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, Box<dyn Error>> {
        let buckets: Self = serde_yaml::from_str(yaml)?;
        buckets.validate()?;
        Ok(buckets)
    }

    /// Load a bucket file from disk.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let yaml = tokio::fs::read_to_string(path).await?;
        let buckets = Self::from_yaml(&yaml)?;
        info!(buckets = buckets.buckets.len(), "Loaded date keyword buckets");
        Ok(buckets)
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        let ranges = self
            .buckets
            .iter()
            .map(|b| (b.name.as_str(), b.range()))
            .chain(std::iter::once(("fallback", self.fallback)));
        for (name, range) in ranges {
            if range.min_days < 0 || range.min_days > range.max_days || range.max_days > MAX_CONFIGURED_DAYS {
                return Err(format!(
                    "invalid day range for bucket '{name}': {}..={}",
                    range.min_days, range.max_days
                )
                .into());
            }
        }
        Ok(())
    }

    /// First bucket with a keyword contained (case-insensitively) in `url_path`.
    pub fn matching(&self, url_path: &str) -> Option<&KeywordBucket> {
        let lowered = url_path.to_lowercase();
        self.buckets.iter().find(|b| b.matches(&lowered))
    }

    /// Estimate a publication date for `url_path`, at noon UTC.
    ///
    /// The day offset is drawn from `rng`, so tests can pass a seeded
    /// generator and assert window membership.
    pub fn estimate<R: Rng + ?Sized>(&self, url_path: &str, now: DateTime<Utc>, rng: &mut R) -> DateTime<Utc> {
        let (name, range) = match self.matching(url_path) {
            Some(bucket) => (bucket.name.as_str(), bucket.range()),
            None => ("fallback", self.fallback),
        };
        let days = rng.random_range(range.min_days..=range.max_days);
        let estimate = clamp_to_window(draw(now, days), now, range);
        debug!(url_path, bucket = name, days, "Estimated date from URL keywords");
        estimate
    }
}

fn draw(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    days_ago(now, days).unwrap_or_else(|| at_noon(now.date_naive()))
}

/// Pinning to noon can move a draw up to half a day past either end of the
/// window; step back inside by one day when it does.
fn clamp_to_window(candidate: DateTime<Utc>, now: DateTime<Utc>, range: DayRange) -> DateTime<Utc> {
    let newest = now - Duration::days(range.min_days);
    let oldest = now - Duration::days(range.max_days);
    if candidate > newest {
        candidate - Duration::days(1)
    } else if candidate < oldest {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn within(dt: DateTime<Utc>, now: DateTime<Utc>, min_days: i64, max_days: i64) -> bool {
        dt <= now - Duration::days(min_days) && dt >= now - Duration::days(max_days)
    }

    #[test]
    fn test_builtin_configuration_parses() {
        let buckets = KeywordBuckets::builtin().unwrap();
        let names: Vec<_> = buckets.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["recent", "mid-term", "older", "oldest"]);
        assert_eq!(buckets.fallback, DayRange { min_days: 30, max_days: 730 });
    }

    #[test]
    fn test_first_matching_bucket_wins() {
        let buckets = KeywordBuckets::builtin().unwrap();
        // Contains both "claude-3-5" and "claude-3"
        let bucket = buckets.matching("/news/claude-3-5-sonnet").unwrap();
        assert_eq!(bucket.name, "recent");
        assert_eq!(buckets.matching("/news/Claude-3-Family").unwrap().name, "mid-term");
        assert!(buckets.matching("/news/quarterly-update").is_none());
    }

    #[test]
    fn test_estimate_stays_in_bucket_window() {
        let buckets = KeywordBuckets::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for hour in [0, 6, 11, 12, 13, 23] {
            let now = Utc.with_ymd_and_hms(2025, 6, 1, hour, 45, 0).unwrap();
            for _ in 0..200 {
                let dt = buckets.estimate("/news/claude-3-5-sonnet", now, &mut rng);
                assert!(within(dt, now, 0, 180), "{dt} outside recent window at {now}");
                assert_eq!(dt.hour(), 12);
                assert_eq!(dt.minute(), 0);

                let dt = buckets.estimate("/news/claude-2", now, &mut rng);
                assert!(within(dt, now, 540, 1080), "{dt} outside older window at {now}");
            }
        }
    }

    #[test]
    fn test_unmatched_path_uses_fallback_window() {
        let buckets = KeywordBuckets::builtin().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        for _ in 0..200 {
            let dt = buckets.estimate("/news/something-else", now, &mut rng);
            assert!(within(dt, now, 30, 730));
        }
    }

    #[test]
    fn test_same_seed_same_estimate() {
        let buckets = KeywordBuckets::builtin().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let a = buckets.estimate("/news/haiku", now, &mut StdRng::seed_from_u64(3));
        let b = buckets.estimate("/news/haiku", now, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let yaml = r#"
buckets:
  - name: broken
    min_days: 100
    max_days: 10
    keywords: [x]
"#;
        assert!(KeywordBuckets::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_fallback_defaults_when_omitted() {
        let yaml = r#"
buckets:
  - name: only
    min_days: 0
    max_days: 30
    keywords: [launch]
"#;
        let buckets = KeywordBuckets::from_yaml(yaml).unwrap();
        assert_eq!(buckets.fallback, DayRange::default());
    }
}
