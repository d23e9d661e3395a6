//! Posting-date normalization relative to the run's clock.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use regex::Regex;

/// Epoch values at or below this are not plausible posting timestamps.
const MIN_EPOCH_SECS: f64 = 1_000_000_000.0;
const MILLIS_THRESHOLD: f64 = 1_000_000_000_000.0;

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\+?\s*(?:day|week|month|hour|minute)").expect("count pattern compiles")
});
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}").expect("iso date pattern compiles"));

/// The number directly in front of a time unit, e.g. 3 in "3 days ago · 25 applicants".
/// A bare unit only counts when phrased as "... ago".
fn count_or(text: &str, bare: i64) -> Option<i64> {
    match COUNT_RE.captures(text) {
        Some(caps) => caps[1].parse().ok(),
        None => text.contains("ago").then_some(bare),
    }
}

fn days_before(today: NaiveDate, days: i64) -> Option<NaiveDate> {
    today.checked_sub_signed(TimeDelta::try_days(days)?)
}

/// "3 days ago", "Today", "Just posted", "2 weeks ago"... to an absolute date.
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let today = now.date_naive();
    if lower.contains("today") || lower.contains("just") {
        return Some(today);
    }
    if lower.contains("yesterday") {
        return days_before(today, 1);
    }
    if lower.contains("hour") || lower.contains("minute") {
        return Some(today);
    }
    if lower.contains("day") {
        return days_before(today, count_or(&lower, 0)?);
    }
    if lower.contains("week") {
        return today.checked_sub_signed(TimeDelta::try_weeks(count_or(&lower, 1)?)?);
    }
    if lower.contains("month") {
        return days_before(today, count_or(&lower, 1)?.checked_mul(30)?);
    }
    None
}

fn embedded_iso(text: &str) -> Option<NaiveDate> {
    let m = ISO_DATE_RE.find(text)?;
    NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok()
}

/// ISO `YYYY-MM-DD` when present anywhere in the text, otherwise relative text.
pub fn parse_posted_date(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    embedded_iso(text).or_else(|| parse_relative_date(text, now))
}

/// Epoch timestamps from embedded blobs, in milliseconds or seconds.
pub fn date_from_epoch(value: f64) -> Option<NaiveDate> {
    if !value.is_finite() || value <= MIN_EPOCH_SECS {
        return None;
    }
    let secs = if value > MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };
    DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).single().unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn relative_phrases() {
        assert_eq!(parse_relative_date("Today", now()), Some(d(2026, 3, 10)));
        assert_eq!(parse_relative_date("Just posted", now()), Some(d(2026, 3, 10)));
        assert_eq!(parse_relative_date("5 hours ago", now()), Some(d(2026, 3, 10)));
        assert_eq!(parse_relative_date("3 days ago", now()), Some(d(2026, 3, 7)));
        assert_eq!(parse_relative_date("30+ days ago", now()), Some(d(2026, 2, 8)));
        assert_eq!(parse_relative_date("2 weeks ago", now()), Some(d(2026, 2, 24)));
        assert_eq!(parse_relative_date("a week ago", now()), Some(d(2026, 3, 3)));
        assert_eq!(parse_relative_date("1 month ago", now()), Some(d(2026, 2, 8)));
    }

    #[test]
    fn unknown_text_has_no_date() {
        assert_eq!(parse_relative_date("", now()), None);
        assert_eq!(parse_relative_date("Hiring now", now()), None);
    }

    #[test]
    fn only_the_unit_count_is_read() {
        assert_eq!(
            parse_relative_date("3 days ago · 25 applicants", now()),
            Some(d(2026, 3, 7))
        );
        assert_eq!(
            parse_relative_date("Posted 2 weeks ago, 140 views", now()),
            Some(d(2026, 2, 24))
        );
    }

    #[test]
    fn weekday_with_full_date_does_not_overflow() {
        assert_eq!(parse_relative_date("Thursday, 2024-03-15 10:30", now()), None);
        assert_eq!(
            parse_posted_date("Thursday, 2024-03-15 10:30", now()),
            Some(d(2024, 3, 15))
        );
        assert_eq!(parse_relative_date("99999999999999 days ago", now()), None);
        assert_eq!(parse_relative_date("999999999999999999999 days ago", now()), None);
        assert_eq!(parse_relative_date("Weekly standups", now()), None);
    }

    #[test]
    fn iso_date_beats_relative_parsing() {
        assert_eq!(parse_posted_date("2026-03-01T10:00:00Z", now()), Some(d(2026, 3, 1)));
        assert_eq!(parse_posted_date("2 days ago", now()), Some(d(2026, 3, 8)));
    }

    #[test]
    fn epoch_millis_and_seconds() {
        assert_eq!(date_from_epoch(1_772_150_400_000.0), Some(d(2026, 2, 27)));
        assert_eq!(date_from_epoch(1_772_150_400.0), Some(d(2026, 2, 27)));
        assert_eq!(date_from_epoch(12_345.0), None);
    }
}
