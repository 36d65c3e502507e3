//! Free-text date parsing.
//!
//! [`parse_date`] accepts the many shapes dates take on listing pages and in
//! metadata attributes and always returns a normalized timestamp string.
//! [`try_parse_date`] is the same parser without the fallbacks, for callers
//! that want to move on to another source when the text is not a date.

use super::{at_noon, days_ago, format_iso};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use tracing::{debug, warn};

/// Age assumed for text that is not a date at all. Never "now", so unknown
/// dates sort below fresh posts.
pub const UNPARSEABLE_FALLBACK_DAYS: i64 = 180;

/// Age assumed when parsing itself fails (out-of-range components, overflow).
pub const FAILURE_FALLBACK_DAYS: i64 = 365;

/// chrono's `%d` and `%Y` accept short digit runs, so `March 2024` reads as
/// day 20 of year 24 under `%B %d %Y`. Anything older than this is a misread.
const MIN_YEAR: i32 = 1000;

const MONTH_FIRST_FORMATS: &[&str] = &["%B %d, %Y", "%B %d %Y", "%B, %d %Y"];
const DAY_FIRST_FORMATS: &[&str] = &["%d %B %Y", "%d %B, %Y"];
const NUMERIC_FORMATS: &[&str] = &["%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y"];

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());
static ABBREVIATION_DOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)\.").unwrap()
});
static SEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b").unwrap());
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})$").unwrap());
static YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").unwrap());
static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(day|week|month|year)s?\s+ago\b").unwrap()
});

/// Parse `text` into a normalized RFC 3339 timestamp.
///
/// Recognized shapes, tried in order:
///
/// | Input | Result |
/// |-------|--------|
/// | `2024-03-05T09:30:00-05:00` | same instant, rendered in UTC |
/// | `2024-03-05T09:30:00`, `2024-03-05` | that day at 12:00 UTC |
/// | `March 5, 2024`, `Mar 5th 2024`, `5 March 2024` | that day at 12:00 UTC |
/// | `03/05/2024`, `2024/03/05`, `05-03-2024` | that day at 12:00 UTC |
/// | `2024-03`, `March 2024` | the 15th of that month |
/// | `2024` | July 1 of that year |
/// | `3 weeks ago` | `now` minus 21 days, at 12:00 UTC |
///
/// Text matching none of these yields a date [`UNPARSEABLE_FALLBACK_DAYS`]
/// ago; a failure while building the date yields one
/// [`FAILURE_FALLBACK_DAYS`] ago.
pub fn parse_date(text: &str, now: DateTime<Utc>) -> String {
    match parse_components(text, now) {
        Ok(Some(dt)) => format_iso(dt),
        Ok(None) => {
            debug!(text, "Unrecognized date text; assuming six months ago");
            format_iso(fallback(now, UNPARSEABLE_FALLBACK_DAYS))
        }
        Err(e) => {
            warn!(text, error = %e, "Failed to parse date; assuming one year ago");
            format_iso(fallback(now, FAILURE_FALLBACK_DAYS))
        }
    }
}

/// Parse `text` without fallbacks: `None` means "not a date I understand".
pub fn try_parse_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match parse_components(text, now) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(text, error = %e, "Discarding unparseable date candidate");
            None
        }
    }
}

fn parse_day(text: &str, fmt: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, fmt)
        .ok()
        .filter(|date| date.year() >= MIN_YEAR)
}

fn fallback(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    days_ago(now, days).unwrap_or_else(|| at_noon(now.date_naive()))
}

fn parse_components(text: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, Box<dyn Error>> {
    let cleaned = normalize(text);
    if cleaned.is_empty() {
        return Ok(None);
    }

    // Full timestamps with a zone keep their instant.
    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = DateTime::parse_from_str(&cleaned, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    // Zone-less timestamps only tell us the day.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Ok(Some(at_noon(naive.date())));
        }
    }
    if let Some(date) = parse_day(&cleaned, "%Y-%m-%d") {
        return Ok(Some(at_noon(date)));
    }

    for fmt in MONTH_FIRST_FORMATS
        .iter()
        .chain(DAY_FIRST_FORMATS)
        .chain(NUMERIC_FORMATS)
    {
        if let Some(date) = parse_day(&cleaned, fmt) {
            return Ok(Some(at_noon(date)));
        }
    }

    if let Some(caps) = YEAR_MONTH.captures(&cleaned) {
        let year: i32 = caps[1].parse()?;
        let month: u32 = caps[2].parse()?;
        let date = NaiveDate::from_ymd_opt(year, month, 15)
            .ok_or_else(|| format!("month out of range: {cleaned}"))?;
        return Ok(Some(at_noon(date)));
    }
    let without_commas = cleaned.replace(',', "");
    if let Some(date) = parse_day(&format!("15 {without_commas}"), "%d %B %Y") {
        return Ok(Some(at_noon(date)));
    }

    if let Some(caps) = YEAR_ONLY.captures(&cleaned) {
        let year: i32 = caps[1].parse()?;
        let date = NaiveDate::from_ymd_opt(year, 7, 1)
            .ok_or_else(|| format!("year out of range: {cleaned}"))?;
        return Ok(Some(at_noon(date)));
    }

    if let Some(caps) = RELATIVE.captures(&cleaned) {
        let count: i64 = caps[1].parse()?;
        let unit_days = match caps[2].to_ascii_lowercase().as_str() {
            "day" => 1,
            "week" => 7,
            "month" => 30,
            _ => 365,
        };
        let days = count
            .checked_mul(unit_days)
            .ok_or_else(|| format!("relative offset overflows: {cleaned}"))?;
        let dt = days_ago(now, days).ok_or_else(|| format!("relative offset out of range: {cleaned}"))?;
        return Ok(Some(dt));
    }

    Ok(None)
}

/// Flatten whitespace and strip the decorations chrono's parser rejects:
/// ordinal suffixes, dots after month abbreviations, the four-letter `Sept`,
/// and stray surrounding punctuation.
fn normalize(text: &str) -> String {
    let collapsed = crate::utils::collapse_whitespace(text);
    let no_ordinals = ORDINAL_SUFFIX.replace_all(&collapsed, "$1");
    let no_dots = ABBREVIATION_DOT.replace_all(&no_ordinals, "$1");
    let sep = SEPT.replace_all(&no_dots, "Sep");
    sep.trim_matches(|c: char| c == ',' || c == '.' || c == '|' || c == '·' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_iso_with_zone_keeps_instant() {
        assert_eq!(
            parse_date("2024-03-05T09:30:00-05:00", now()),
            "2024-03-05T14:30:00+00:00"
        );
        assert_eq!(parse_date("2024-03-05T09:30:00Z", now()), "2024-03-05T09:30:00+00:00");
    }

    #[test]
    fn test_iso_without_zone_is_noon_utc() {
        assert_eq!(parse_date("2024-03-05T22:10:00", now()), "2024-03-05T12:00:00+00:00");
        assert_eq!(parse_date("2024-03-05", now()), "2024-03-05T12:00:00+00:00");
    }

    #[test]
    fn test_month_name_forms() {
        let expected = "2024-03-05T12:00:00+00:00";
        for text in [
            "March 5, 2024",
            "March 5 2024",
            "Mar 5, 2024",
            "Mar. 5, 2024",
            "Mar 5th, 2024",
            "5 March 2024",
            "5 Mar 2024",
            "  March   5,\n 2024 ",
        ] {
            assert_eq!(parse_date(text, now()), expected, "input: {text:?}");
        }
        assert_eq!(parse_date("Sept 9, 2023", now()), "2023-09-09T12:00:00+00:00");
    }

    #[test]
    fn test_numeric_forms() {
        assert_eq!(parse_date("03/05/2024", now()), "2024-03-05T12:00:00+00:00");
        assert_eq!(parse_date("25/12/2023", now()), "2023-12-25T12:00:00+00:00");
        assert_eq!(parse_date("2024/03/05", now()), "2024-03-05T12:00:00+00:00");
        assert_eq!(parse_date("03-05-2024", now()), "2024-03-05T12:00:00+00:00");
    }

    #[test]
    fn test_partial_dates() {
        assert_eq!(parse_date("2024-03", now()), "2024-03-15T12:00:00+00:00");
        assert_eq!(parse_date("March 2024", now()), "2024-03-15T12:00:00+00:00");
        assert_eq!(parse_date("2023", now()), "2023-07-01T12:00:00+00:00");
    }

    #[test]
    fn test_month_year_is_not_read_as_day_and_short_year() {
        assert_eq!(parse_date("Dec 2023", now()), "2023-12-15T12:00:00+00:00");
        assert_eq!(parse_date("June 1999", now()), "1999-06-15T12:00:00+00:00");
        assert_eq!(parse_date("September, 2024", now()), "2024-09-15T12:00:00+00:00");
        // Full day-level dates still win over the month-year reading.
        assert_eq!(parse_date("12 June 2023", now()), "2023-06-12T12:00:00+00:00");
        assert_eq!(parse_date("June 12 2023", now()), "2023-06-12T12:00:00+00:00");
        assert!(try_parse_date("March 24", now()).is_none());
    }

    #[test]
    fn test_relative_phrases() {
        assert_eq!(parse_date("2 weeks ago", now()), "2025-03-06T12:00:00+00:00");
        assert_eq!(parse_date("1 day ago", now()), "2025-03-19T12:00:00+00:00");
        assert_eq!(parse_date("3 months ago", now()), "2024-12-20T12:00:00+00:00");
        assert_eq!(parse_date("Updated 1 year ago", now()), "2024-03-20T12:00:00+00:00");
    }

    #[test]
    fn test_relative_two_weeks_against_wall_clock() {
        let now = Utc::now();
        let expected = (now - chrono::Duration::days(14)).date_naive();
        let parsed = DateTime::parse_from_rfc3339(&parse_date("2 weeks ago", now)).unwrap();
        assert_eq!(parsed.date_naive(), expected);
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_unparseable_text_is_six_months_ago_not_now() {
        assert_eq!(parse_date("coming soon", now()), "2024-09-21T12:00:00+00:00");
        assert_eq!(parse_date("", now()), "2024-09-21T12:00:00+00:00");
    }

    #[test]
    fn test_failures_are_one_year_ago() {
        assert_eq!(parse_date("2024-13", now()), "2024-03-20T12:00:00+00:00");
        assert_eq!(
            parse_date("99999999999999999 years ago", now()),
            "2024-03-20T12:00:00+00:00"
        );
    }

    #[test]
    fn test_try_parse_date_has_no_fallback() {
        assert!(try_parse_date("read more", now()).is_none());
        assert!(try_parse_date("2024-13", now()).is_none());
        assert!(try_parse_date("Jan 2, 2024", now()).is_some());
    }
}
