use time::macros::format_description;
use time::Date;

use crate::ValidationError;

const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

/// Parse a calendar date as it appears in exchange bhavcopy files.
///
/// Accepts ISO (`2024-01-25`), NSE (`25-Jan-2024`, month name in any case)
/// and date-time values whose date part is one of those (`2024-01-25T00:00:00`).
pub fn parse_source_date(field: &'static str, raw: &str) -> Result<Date, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField { field });
    }

    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);

    Date::parse(date_part, format_description!("[year]-[month]-[day]"))
        .or_else(|_| {
            Date::parse(
                date_part,
                format_description!(
                    "[day padding:none]-[month repr:short case_sensitive:false]-[year]"
                ),
            )
        })
        .map_err(|_| ValidationError::InvalidDate {
            field,
            value: trimmed.to_owned(),
        })
}

/// Date `days` after 1970-01-01, as DuckDB's `date_diff('day', ...)` reports it.
pub fn from_epoch_day(days: i64) -> Result<Date, ValidationError> {
    i32::try_from(days)
        .ok()
        .and_then(|days| days.checked_add(UNIX_EPOCH_JULIAN_DAY))
        .and_then(|julian| Date::from_julian_day(julian).ok())
        .ok_or(ValidationError::EpochDayOutOfRange { days })
}
