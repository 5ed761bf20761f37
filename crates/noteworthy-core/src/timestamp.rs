//! The human-readable `lastModified` timestamp.
//!
//! Notes carry timestamps like `"3/14/2024 at 9:05 AM"`. They are written
//! from the local clock on every save and parsed back only for sorting.

use chrono::{Local, NaiveDate, NaiveDateTime};

const FORMAT: &str = "%-m/%-d/%Y at %-I:%M %p";

/// Format a local date-time as `M/D/YYYY at H:MM AM|PM`.
pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(FORMAT).to_string()
}

/// The current local time, formatted.
pub fn now_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

/// Parse a `M/D/YYYY at H:MM AM|PM` timestamp. Zero-padded fields are accepted.
///
/// Returns None if the string cannot be parsed.
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    let (date_part, time_part) = input.trim().split_once(" at ")?;

    let mut date_fields = date_part.trim().split('/');
    let month: u32 = date_fields.next()?.trim().parse().ok()?;
    let day: u32 = date_fields.next()?.trim().parse().ok()?;
    let year: i32 = date_fields.next()?.trim().parse().ok()?;
    if date_fields.next().is_some() {
        return None;
    }

    let (clock, meridiem) = time_part.trim().split_once(' ')?;
    let (hour, minute) = clock.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour = match meridiem.trim().to_ascii_lowercase().as_str() {
        "am" if hour == 12 => 0,
        "am" => hour,
        "pm" if hour == 12 => 12,
        "pm" => hour + 12,
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}
