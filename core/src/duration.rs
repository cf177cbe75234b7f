//! Coarse, human readable rendering of tracked time.
//!
//! Buckets follow the familiar relative-time wording ("a few seconds",
//! "a minute", "2 hours", ...). Larger inputs never land in a smaller bucket.
//!
//! # Example
//!
//! ```
//! use quadtodo_core::duration::{display_label, humanize};
//!
//! assert_eq!(humanize(65), "a minute");
//! assert_eq!(display_label(65).as_deref(), Some("a minute (65s)"));
//! assert_eq!(display_label(0), None);
//! ```

use std::fmt;

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 3_600.0;
const SECS_PER_DAY: f64 = 86_400.0;

/// Average months per day over the 400-year Gregorian cycle.
const MONTHS_PER_DAY: f64 = 4_800.0 / 146_097.0;

/// Upper bound (inclusive) of the "a few seconds" bucket.
const FEW_SECONDS_MAX: u64 = 44;
const MINUTES_LIMIT: u64 = 45;
const HOURS_LIMIT: u64 = 22;
const DAYS_LIMIT: u64 = 26;
const MONTHS_LIMIT: u64 = 11;

/// Relative-time bucket. Variant order is magnitude order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    FewSeconds,
    Minute,
    Minutes(u64),
    Hour,
    Hours(u64),
    Day,
    Days(u64),
    Month,
    Months(u64),
    Year,
    Years(u64),
}

impl Bucket {
    fn of(seconds: u64) -> Self {
        let secs = seconds as f64;
        let minutes = (secs / SECS_PER_MINUTE).round() as u64;
        let hours = (secs / SECS_PER_HOUR).round() as u64;
        let exact_days = secs / SECS_PER_DAY;
        let days = exact_days.round() as u64;
        let exact_months = exact_days * MONTHS_PER_DAY;
        let months = exact_months.round() as u64;
        let years = (exact_months / 12.0).round() as u64;

        if seconds <= FEW_SECONDS_MAX {
            Self::FewSeconds
        } else if minutes <= 1 {
            Self::Minute
        } else if minutes < MINUTES_LIMIT {
            Self::Minutes(minutes)
        } else if hours <= 1 {
            Self::Hour
        } else if hours < HOURS_LIMIT {
            Self::Hours(hours)
        } else if days <= 1 {
            Self::Day
        } else if days < DAYS_LIMIT {
            Self::Days(days)
        } else if months <= 1 {
            Self::Month
        } else if months < MONTHS_LIMIT {
            Self::Months(months)
        } else if years <= 1 {
            Self::Year
        } else {
            Self::Years(years)
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FewSeconds => f.write_str("a few seconds"),
            Self::Minute => f.write_str("a minute"),
            Self::Minutes(n) => write!(f, "{n} minutes"),
            Self::Hour => f.write_str("an hour"),
            Self::Hours(n) => write!(f, "{n} hours"),
            Self::Day => f.write_str("a day"),
            Self::Days(n) => write!(f, "{n} days"),
            Self::Month => f.write_str("a month"),
            Self::Months(n) => write!(f, "{n} months"),
            Self::Year => f.write_str("a year"),
            Self::Years(n) => write!(f, "{n} years"),
        }
    }
}

/// Renders `seconds` as a coarse English duration.
#[must_use]
pub fn humanize(seconds: u64) -> String {
    Bucket::of(seconds).to_string()
}

/// Row label for an item: `"<bucket> (<seconds>s)"`, or `None` when nothing
/// has been tracked yet.
#[must_use]
pub fn display_label(seconds: u64) -> Option<String> {
    if seconds == 0 {
        return None;
    }
    Some(format!("{} ({}s)", humanize(seconds), seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_bucket() {
        assert_eq!(humanize(0), "a few seconds");
        assert_eq!(humanize(44), "a few seconds");
    }

    #[test]
    fn minute_buckets() {
        assert_eq!(humanize(45), "a minute");
        assert_eq!(humanize(65), "a minute");
        assert_eq!(humanize(89), "a minute");
        assert_eq!(humanize(90), "2 minutes");
        assert_eq!(humanize(30 * 60), "30 minutes");
    }

    #[test]
    fn hour_buckets() {
        assert_eq!(humanize(3_600), "an hour");
        assert_eq!(humanize(2 * 3_600), "2 hours");
        assert_eq!(humanize(21 * 3_600), "21 hours");
    }

    #[test]
    fn day_month_year_buckets() {
        assert_eq!(humanize(86_400), "a day");
        assert_eq!(humanize(3 * 86_400), "3 days");
        assert_eq!(humanize(40 * 86_400), "a month");
        assert_eq!(humanize(100 * 86_400), "3 months");
        assert_eq!(humanize(400 * 86_400), "a year");
        assert_eq!(humanize(800 * 86_400), "2 years");
    }

    #[test]
    fn buckets_are_monotonic() {
        let mut previous = Bucket::of(0);
        let mut seconds = 0_u64;
        while seconds < 5 * 365 * 86_400 {
            let current = Bucket::of(seconds);
            assert!(
                current >= previous,
                "bucket went backwards at {seconds}s: {previous} -> {current}"
            );
            previous = current;
            seconds += if seconds < 7_200 { 1 } else { 997 };
        }
    }

    #[test]
    fn label_suppressed_for_zero() {
        assert_eq!(display_label(0), None);
    }

    #[test]
    fn label_has_numeric_suffix() {
        assert_eq!(display_label(65).as_deref(), Some("a minute (65s)"));
        assert_eq!(display_label(3).as_deref(), Some("a few seconds (3s)"));
    }
}
