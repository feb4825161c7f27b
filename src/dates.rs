//! Posting-date normalization.
//!
//! Providers report dates as ISO strings, epoch numbers, or phrases such
//! as "2 days ago". Everything is reduced to a `YYYY-MM-DD` string or
//! `None`. An unparseable date is never an error: callers treat `None`
//! as "unknown".

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, Utc, Weekday};
use log::debug;

use crate::models::RawDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Epoch values at or above this magnitude are milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: [&str; 7] = [
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%Y-%m-%d",
];

/// Normalizes dates relative to a fixed reference clock.
#[derive(Debug, Clone, Copy)]
pub struct DateNormalizer {
    now: NaiveDateTime,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DateNormalizer {
    /// Normalizer anchored at the current UTC time, the same clock that
    /// stamps `scraped_at`.
    pub fn new() -> Self {
        Self::at(Utc::now().naive_utc())
    }

    /// Normalizer anchored at `now`, for reproducible relative phrases.
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn normalize(&self, input: Option<&RawDate>) -> Option<String> {
        let date = match input? {
            RawDate::Text(text) => return self.normalize_text(text),
            RawDate::Date(date) => *date,
            RawDate::Timestamp(ts) => ts.date_naive(),
            RawDate::EpochMillis(epoch) => {
                let ts = if epoch.unsigned_abs() >= MILLIS_THRESHOLD {
                    DateTime::from_timestamp_millis(*epoch)
                } else {
                    DateTime::from_timestamp(*epoch, 0)
                };
                match ts {
                    Some(ts) => ts.date_naive(),
                    None => {
                        debug!("Epoch value {} is out of range", epoch);
                        return None;
                    }
                }
            }
        };
        Some(date.format(DATE_FORMAT).to_string())
    }

    pub fn normalize_text(&self, input: &str) -> Option<String> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        if looks_canonical(text) {
            // Already canonical: hand back untouched if it is a real date.
            return NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(|_| text.to_string());
        }

        let parsed = self
            .parse_absolute(text)
            .or_else(|| self.parse_relative(&text.to_lowercase()));

        match parsed {
            Some(date) => Some(date.format(DATE_FORMAT).to_string()),
            None => {
                debug!("Unparseable date '{}', storing as unknown", text);
                None
            }
        }
    }

    fn parse_absolute(&self, text: &str) -> Option<NaiveDate> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Some(ts.date_naive());
        }
        for format in DATETIME_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
                return Some(ts.date());
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return Some(date);
            }
        }
        self.parse_month_day(text)
    }

    /// `MM/DD` with no year: the most recent such date not after today.
    fn parse_month_day(&self, text: &str) -> Option<NaiveDate> {
        let (month, day) = text.split_once('/')?;
        let month: u32 = month.parse().ok()?;
        let day: u32 = day.parse().ok()?;
        let today = self.today();
        let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
        match this_year {
            Some(date) if date <= today => Some(date),
            _ => NaiveDate::from_ymd_opt(today.year() - 1, month, day),
        }
    }

    fn parse_relative(&self, text: &str) -> Option<NaiveDate> {
        let today = self.today();
        match text {
            "today" | "now" | "just now" | "just posted" => return Some(today),
            "yesterday" => return today.checked_sub_days(Days::new(1)),
            "tomorrow" => return today.checked_add_days(Days::new(1)),
            _ => {}
        }

        if let Ok(weekday) = text.parse::<Weekday>() {
            return Some(most_recent(today, weekday));
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        let [amount, unit, "ago"] = tokens.as_slice() else {
            return None;
        };
        let amount = parse_amount(amount)?;
        let unit: &str = unit;
        let unit = unit.strip_suffix('s').unwrap_or(unit);

        match unit {
            "second" | "sec" => Some((self.now - Duration::seconds(amount)).date()),
            "minute" | "min" => Some((self.now - Duration::minutes(amount)).date()),
            "hour" | "hr" => Some((self.now - Duration::hours(amount)).date()),
            "day" => today.checked_sub_days(Days::new(amount as u64)),
            "week" => today.checked_sub_days(Days::new(amount as u64 * 7)),
            "month" => today.checked_sub_months(Months::new(amount as u32)),
            "year" => today.checked_sub_months(Months::new(amount as u32 * 12)),
            _ => None,
        }
    }
}

/// Normalize against the current UTC clock.
pub fn normalize_date(input: Option<&RawDate>) -> Option<String> {
    DateNormalizer::new().normalize(input)
}

fn looks_canonical(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

fn parse_amount(token: &str) -> Option<i64> {
    match token {
        "a" | "an" | "one" => Some(1),
        _ => {
            let digits = token.strip_suffix('+').unwrap_or(token);
            let value: i64 = digits.parse().ok()?;
            // Caps keep Duration and Months arithmetic in range.
            (0..=100_000).contains(&value).then_some(value)
        }
    }
}

fn most_recent(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (7 + today.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    today - Duration::days(back as i64)
}
