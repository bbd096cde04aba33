use chrono::{DateTime, Duration, Months, NaiveDate, SecondsFormat, Utc};

use super::interval::{Frequency, RecurrenceInterval};
use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| Error::InvalidDate(s.to_string()))
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidDate(s.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// `2026-02-20T10:00:00Z` (second precision, `Z` suffix).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The UTC calendar date of an instant, as an ISO string.
pub fn date_of(ts: DateTime<Utc>) -> String {
    format_date(ts.date_naive())
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Month and year steps clamp to the last day of the target month:
/// `2026-01-31 + 1 month = 2026-02-28`, `2024-02-29 + 1 year = 2025-02-28`.
pub fn add_interval(date: NaiveDate, interval: RecurrenceInterval) -> Result<NaiveDate> {
    let n = interval.interval;
    let shifted = match interval.frequency {
        Frequency::Daily => date.checked_add_signed(Duration::days(i64::from(n))),
        Frequency::Weekly => date.checked_add_signed(Duration::weeks(i64::from(n))),
        Frequency::Monthly => date.checked_add_months(Months::new(n)),
        Frequency::Yearly => n
            .checked_mul(12)
            .and_then(|months| date.checked_add_months(Months::new(months))),
    };
    shifted.ok_or_else(|| Error::InvalidDate(format!("{} + {}", format_date(date), interval)))
}

pub fn shift_calendar_date(iso_date: &str, interval: RecurrenceInterval) -> Result<String> {
    let date = parse_date(iso_date)?;
    add_interval(date, interval).map(format_date)
}

/// Shift the UTC calendar date of a timestamp; used for `defer_until` after completion.
pub fn shift_timestamp_to_calendar_date(
    iso_timestamp: &str,
    interval: RecurrenceInterval,
) -> Result<String> {
    let ts = parse_timestamp(iso_timestamp)?;
    add_interval(ts.date_naive(), interval).map(format_date)
}
