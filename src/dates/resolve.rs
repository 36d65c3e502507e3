//! The date cascade.
//!
//! A [`DateResolver`] turns a markup fragment (plus, optionally, the URL path
//! of the article it describes) into a publication date by trying a fixed
//! list of strategies in order. Each strategy is a plain function returning
//! `Option<DateTime<Utc>>`; the first `Some` wins:
//!
//! 1. a `<time datetime="...">` attribute
//! 2. the displayed text of a time-like element
//! 3. date-shaped text anywhere in the fragment
//! 4. a `/YYYY/MM/` or `/YYYY/` segment in the URL path
//! 5. keyword estimation over the URL path
//! 6. one year ago, flagged as a low-confidence default

use super::{KeywordBuckets, at_noon, days_ago, format_iso, try_parse_date};
use crate::utils::collapse_whitespace;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::fmt;
use tracing::{debug, warn};

const MONTHS: &str = concat!(
    "Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|",
    "Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?"
);

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap());
static MONTH_FIRST_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b((?:{MONTHS})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}})\b"
    ))
    .unwrap()
});
static DAY_FIRST_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTHS})\.?,?\s+\d{{4}})\b"
    ))
    .unwrap()
});
static URL_YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/((?:19|20)\d{2})/(\d{1,2})(?:/|$)").unwrap());
static URL_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"/((?:19|20)\d{2})(?:/|$)").unwrap());

static TIME_WITH_DATETIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static TIME_LIKE: Lazy<Selector> = Lazy::new(|| Selector::parse("time, [class*='date']").unwrap());

/// Age of the last-resort default.
pub const DEFAULT_AGE_DAYS: i64 = 365;

/// Which step of the cascade produced a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStrategy {
    DatetimeAttribute,
    TimeElementText,
    TextPattern,
    UrlPath,
    KeywordEstimate,
    Default,
}

impl fmt::Display for DateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DateStrategy::DatetimeAttribute => "datetime_attribute",
            DateStrategy::TimeElementText => "time_element_text",
            DateStrategy::TextPattern => "text_pattern",
            DateStrategy::UrlPath => "url_path",
            DateStrategy::KeywordEstimate => "keyword_estimate",
            DateStrategy::Default => "default",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: DateTime<Utc>,
    pub strategy: DateStrategy,
}

impl ResolvedDate {
    pub fn to_iso(&self) -> String {
        format_iso(self.date)
    }

    /// True for the fixed default, which carries no information at all.
    pub fn is_low_confidence(&self) -> bool {
        self.strategy == DateStrategy::Default
    }
}

type FragmentStrategy = fn(ElementRef<'_>, DateTime<Utc>) -> Option<DateTime<Utc>>;

const FRAGMENT_STRATEGIES: [(DateStrategy, FragmentStrategy); 3] = [
    (DateStrategy::DatetimeAttribute, from_datetime_attribute),
    (DateStrategy::TimeElementText, from_time_element_text),
    (DateStrategy::TextPattern, from_fragment_text),
];

/// Runs the cascade against a fixed notion of "now" and a random source for
/// keyword estimation.
pub struct DateResolver<R = StdRng> {
    buckets: KeywordBuckets,
    now: DateTime<Utc>,
    rng: R,
}

impl DateResolver<StdRng> {
    /// A resolver anchored at the current time with an OS-seeded generator.
    pub fn new(buckets: KeywordBuckets) -> Self {
        Self::with_rng(buckets, Utc::now(), StdRng::from_os_rng())
    }
}

impl<R: Rng> DateResolver<R> {
    pub fn with_rng(buckets: KeywordBuckets, now: DateTime<Utc>, rng: R) -> Self {
        Self { buckets, now, rng }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Resolve a date for `fragment`, returning the normalized string.
    pub fn extract_date(&mut self, fragment: ElementRef<'_>, url_path: Option<&str>) -> String {
        let resolved = self.resolve(fragment, url_path);
        debug!(
            strategy = %resolved.strategy,
            low_confidence = resolved.is_low_confidence(),
            url_path = url_path.unwrap_or(""),
            "Resolved date"
        );
        resolved.to_iso()
    }

    /// Run the full cascade and report which strategy answered.
    pub fn resolve(&mut self, fragment: ElementRef<'_>, url_path: Option<&str>) -> ResolvedDate {
        for (strategy, find) in FRAGMENT_STRATEGIES {
            if let Some(date) = find(fragment, self.now) {
                return ResolvedDate { date, strategy };
            }
        }
        self.resolve_path(url_path)
    }

    /// Steps 4 to 6 of the cascade, for callers that have no markup.
    pub fn resolve_path(&mut self, url_path: Option<&str>) -> ResolvedDate {
        if let Some(path) = url_path {
            if let Some(date) = from_url_path(path) {
                return ResolvedDate {
                    date,
                    strategy: DateStrategy::UrlPath,
                };
            }
            let date = self.buckets.estimate(path, self.now, &mut self.rng);
            return ResolvedDate {
                date,
                strategy: DateStrategy::KeywordEstimate,
            };
        }

        let date = days_ago(self.now, DEFAULT_AGE_DAYS).unwrap_or_else(|| at_noon(self.now.date_naive()));
        warn!(date = %format_iso(date), "No date evidence; using low-confidence default");
        ResolvedDate {
            date,
            strategy: DateStrategy::Default,
        }
    }
}

fn self_and_descendants<'a>(
    fragment: ElementRef<'a>,
    selector: &'a Selector,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    let own = if selector.matches(&fragment) { Some(fragment) } else { None };
    own.into_iter().chain(fragment.select(selector))
}

/// Step 1: a machine-readable `datetime` attribute on a `<time>` element.
pub fn from_datetime_attribute(fragment: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    self_and_descendants(fragment, &TIME_WITH_DATETIME)
        .filter_map(|el| el.value().attr("datetime"))
        .find_map(|value| try_parse_date(value, now))
}

/// Step 2: the visible text of `<time>` or a `*date*`-classed element.
pub fn from_time_element_text(fragment: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    self_and_descendants(fragment, &TIME_LIKE)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .find_map(|text| try_parse_date(&text, now).or_else(|| find_date_in_text(&text, now)))
}

/// Step 3: date-shaped substrings of the fragment's rendered text.
pub fn from_fragment_text(fragment: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = fragment.text().collect::<Vec<_>>().join(" ");
    find_date_in_text(&text, now)
}

/// Search `text` for an ISO date, then a month-first date, then a day-first
/// date, returning the first match that parses.
pub fn find_date_in_text(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    [&*ISO_DATE, &*MONTH_FIRST_DATE, &*DAY_FIRST_DATE]
        .into_iter()
        .flat_map(|re| re.captures_iter(text))
        .find_map(|caps| try_parse_date(&caps[1], now))
}

/// Step 4: `/YYYY/MM/` pins the 15th of the month, `/YYYY/` pins July 1.
pub fn from_url_path(path: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = URL_YEAR_MONTH.captures(path) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, 15) {
            debug!(path, "Date taken from URL year/month");
            return Some(at_noon(date));
        }
    }
    let caps = URL_YEAR.captures(path)?;
    let year: i32 = caps[1].parse().ok()?;
    NaiveDate::from_ymd_opt(year, 7, 1).map(at_noon)
}
