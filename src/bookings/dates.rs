//! Calendar-date normalization for booking columns.
//!
//! Stored dates arrive as free text: plain ISO dates, naive timestamps
//! (with or without fractional seconds), offset-carrying timestamps with a
//! `T` or a space separator, or the `DD.MM.YYYY` display format. Everything
//! is reduced to a civil date in Europe/Oslo.

use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    Date, Duration, OffsetDateTime, PrimitiveDateTime, Weekday,
};
use time_tz::{timezones, OffsetDateTimeExt, Tz};

const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DISPLAY_DATE: &[FormatItem<'static>] = format_description!("[day].[month].[year]");
const NAIVE_SPACE: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);
const NAIVE_T: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);
// `2024-03-14 08:00:00+01:00`
const OFFSET_SPACE: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]][offset_hour]:[offset_minute]"
);

/// Placeholders legacy rows carry in place of a missing date.
const ABSENT_MARKERS: [&str; 2] = ["None", "1"];

/// Civil timezone every booking date is interpreted in.
pub fn oslo() -> &'static Tz {
    timezones::db::europe::OSLO
}

/// Parses one stored date value into its Oslo calendar date.
///
/// Naive values are taken as Oslo wall-clock time, so their date is kept
/// as written. Offset-carrying values are converted to Oslo first.
/// Returns `None` when no accepted format matches.
pub fn normalize_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = Date::parse(raw, ISO_DATE) {
        return Some(date);
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(raw, OFFSET_SPACE))
    {
        return Some(dt.to_timezone(oslo()).date());
    }
    for format in [NAIVE_SPACE, NAIVE_T] {
        if let Ok(dt) = PrimitiveDateTime::parse(raw, format) {
            return Some(dt.date());
        }
    }
    Date::parse(raw, DISPLAY_DATE).ok()
}

/// A non-empty value that matched none of the accepted formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized date format")]
pub struct UnrecognizedDate;

/// Like [`normalize_date`] but an empty or missing value means "absent",
/// as do the `None` and `1` placeholders found in older rows.
pub fn normalize_optional_date(raw: Option<&str>) -> Result<Option<Date>, UnrecognizedDate> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if ABSENT_MARKERS.contains(&value) => Ok(None),
        Some(value) => normalize_date(value).map(Some).ok_or(UnrecognizedDate),
    }
}

/// The Oslo calendar date of an instant. Callers pass the clock in.
pub fn oslo_date(now: OffsetDateTime) -> Date {
    now.to_timezone(oslo()).date()
}

/// Storage form of a date, `YYYY-MM-DD`.
pub fn format_iso(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_else(|_| date.to_string())
}

/// The first Friday strictly after `today`.
pub fn next_friday(today: Date) -> Date {
    let mut ahead = Weekday::Friday.number_days_from_monday() as i64
        - today.weekday().number_days_from_monday() as i64;
    if ahead <= 0 {
        ahead += 7;
    }
    today + Duration::days(ahead)
}
