//! Calendar date parsing.
//!
//! Cycle boundaries are strict `YYYY-MM-DD`. Record dates written by older
//! clients may also be datetimes, which are reduced to their calendar date.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::errors::ValidationError;

/// Storage and display format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses a strict `YYYY-MM-DD` date.
///
/// # Errors
/// Returns [`ValidationError::InvalidDate`] for anything else.
pub fn parse_calendar_date(input: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidDate {
            input: input.to_string(),
        }
    })
}

/// Reduces a stored record date to its calendar date.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (the date is taken as written,
/// without shifting time zones) and naive datetimes. Returns `None` for empty
/// or unrecognised values.
#[must_use]
pub fn normalize_record_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Some(date);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|datetime| datetime.date())
}

/// Formats a date for storage.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
