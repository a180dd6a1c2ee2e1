use chrono::{Datelike, NaiveDate};
use tracing::warn;

/// Textual date layouts seen on scanned cards and permits, tried in order.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%y",
    "%d-%m-%y",
];

fn is_four_digit_year(format: &str) -> bool {
    format.contains("%Y")
}

/// Parse a date written in one of [`DEFAULT_DATE_FORMATS`].
///
/// `%Y` layouts only accept four-digit years so that `25/12/24` falls through
/// to the two-digit `%y` layouts instead of becoming year 24.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DEFAULT_DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(trimmed, format)
            .ok()
            .filter(|date| !is_four_digit_year(format) || date.year() >= 1000)
    })
}

/// Normalize a date string to `YYYY-MM-DD`, or `None` when it cannot be parsed.
pub fn normalize_date(raw: &str) -> Option<String> {
    match parse_date(raw) {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => {
            if !raw.trim().is_empty() {
                warn!(value = %raw.trim(), "could not parse date value; storing NULL");
            }
            None
        }
    }
}
