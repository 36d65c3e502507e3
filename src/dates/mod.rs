//! Publication date inference.
//!
//! Listing pages on the target site are inconsistent about dates: some cards
//! carry a `<time datetime>` element, some only a human-readable string, and
//! many nothing at all. This module always produces *some* plausible date:
//!
//! - [`parse`]: free text to a normalized UTC timestamp
//! - [`estimate`]: keyword-bucket estimation from a URL path
//! - [`resolve`]: the ordered strategy cascade over a markup fragment
//!
//! Every date leaves this module as an RFC 3339 string with an explicit
//! `+00:00` offset (see [`format_iso`]). Dates that were only known to the
//! day are pinned to 12:00 UTC so later timezone conversions cannot push them
//! across a day boundary.

pub mod estimate;
pub mod parse;
pub mod resolve;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};

pub use estimate::KeywordBuckets;
pub use parse::{parse_date, try_parse_date};
pub use resolve::DateResolver;

/// Render a timestamp the way articles store it: `2024-01-01T12:00:00+00:00`.
pub fn format_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// 12:00:00 UTC on `date`.
pub fn at_noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
        .and_utc()
}

/// Noon UTC on the calendar day `days` days before `now`.
///
/// Returns `None` when the arithmetic leaves chrono's representable range.
pub fn days_ago(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    let delta = Duration::try_days(days)?;
    let then = now.checked_sub_signed(delta)?;
    Some(at_noon(then.date_naive()))
}
