//! Time-of-day formatting.
//!
//! Dose times are stored and matched as canonical 12-hour display strings
//! (`"8:00 AM"`, `"12:05 PM"`). Drafts arriving from time-picker style inputs
//! carry 24-hour `"HH:MM"` values; this module converts between the two.
//! The schedule checker formats the current wall-clock time with the same
//! [`DISPLAY_FORMAT`], so string equality is the only matching rule needed.

use chrono::NaiveTime;

/// strftime pattern for the canonical display form: no-pad 12-hour, zero-pad
/// minutes, upper-case meridiem.
pub const DISPLAY_FORMAT: &str = "%-I:%M %p";

/// Convert a 24-hour `"HH:MM"` string to its 12-hour display form.
///
/// Returns `None` when the input is not a valid `HH:MM` time.
///
/// # Examples
///
/// ```
/// use pillbox::timefmt::format_12h;
///
/// assert_eq!(format_12h("00:05").as_deref(), Some("12:05 AM"));
/// assert_eq!(format_12h("13:30").as_deref(), Some("1:30 PM"));
/// assert_eq!(format_12h("not a time"), None);
/// ```
pub fn format_12h(hhmm: &str) -> Option<String> {
    let time = NaiveTime::parse_from_str(hhmm, "%H:%M").ok()?;
    Some(time.format(DISPLAY_FORMAT).to_string())
}

/// Normalize a draft time entry into display form.
///
/// 24-hour input is converted; anything else (including values already in
/// display form) is kept verbatim so stored data is never rewritten.
pub fn normalize(time: &str) -> String {
    format_12h(time).unwrap_or_else(|| time.trim().to_string())
}
