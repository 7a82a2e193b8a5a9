use std::fmt::Write;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Serial day of 1970-01-01 in the 1900 date system
pub const UNIX_EPOCH_SERIAL: f64 = 25569.;

const SECONDS_PER_DAY: f64 = 86_400.;

static DATE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// How the numeric value of a cell must be displayed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// Calendar date only
    Date,
    /// Calendar date with time of day
    DateTime,
    /// Anything else, displayed as stored
    #[default]
    Other,
}

/// Check excel number format type from a custom format code
///
/// A code is a date if it holds day, month and year tokens separated by one
/// separator character (`d.m.yy`, `dd/mm/yyyy`, `d-mmm-yy`...). It is a
/// datetime if the date is followed by a space and hour/minute tokens.
///
/// # Examples
///
/// ```
/// use xlsx_csv::{detect_format_kind, FormatKind};
///
/// assert_eq!(detect_format_kind("dd/mm/yyyy"), FormatKind::Date);
/// assert_eq!(detect_format_kind("dd/mm/yyyy hh:mm"), FormatKind::DateTime);
/// assert_eq!(detect_format_kind("0.00%"), FormatKind::Other);
/// ```
pub fn detect_format_kind(format: &str) -> FormatKind {
    let pattern = DATE_PATTERN.get_or_init(|| {
        Regex::new(r"(d{1,2}[ -./]m{1,3}[ -./]y{1,4})( h{1,2}:m{1,2})?")
            .expect("date pattern is a valid regex")
    });
    match pattern.captures(format) {
        Some(captures) if captures.get(2).is_some() => FormatKind::DateTime,
        Some(_) => FormatKind::Date,
        None => FormatKind::Other,
    }
}

/// Formats an excel serial day count (1900 date system) with a strftime pattern.
///
/// The fractional part of the serial is the time of day. Returns `None` if
/// `raw` is not a number or is out of the representable date range.
pub fn format_excel_serial(raw: &str, pattern: &str) -> Option<String> {
    let serial: f64 = fast_float2::parse(raw.trim()).ok()?;
    if !serial.is_finite() {
        return None;
    }
    let seconds = ((serial - UNIX_EPOCH_SERIAL) * SECONDS_PER_DAY).round();
    if seconds < i64::MIN as f64 || seconds > i64::MAX as f64 {
        return None;
    }
    let datetime = DateTime::<Utc>::from_timestamp(seconds as i64, 0)?;
    let mut out = String::with_capacity(pattern.len() + 8);
    write!(out, "{}", datetime.format(pattern)).ok()?;
    Some(out)
}
