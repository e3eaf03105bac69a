//! Lenient parsing of `Date:` header values.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

/// Parse a `Date:` header value, keeping the sender's UTC offset.
///
/// RFC 2822 is tried first, then a few common deviations (trailing comments
/// like `(UTC)`, missing day-of-week, named time zones, ISO 8601). Returns
/// `None` when nothing matches.
pub fn parse_email_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = strip_trailing_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let no_dow = strip_day_of_week(trimmed);
    let with_offset = replace_named_tz(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    for candidate in [&no_dow, &with_offset] {
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt);
            }
        }
    }

    // No zone at all: read it as UTC.
    for fmt in ["%d %b %Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&no_dow, fmt) {
            return Some(Utc.from_utc_datetime(&ndt).fixed_offset());
        }
    }

    debug!(date = trimmed, "Could not parse date header");
    None
}

/// Drop a trailing parenthesized comment: `"... +0000 (UTC)"` → `"... +0000"`.
fn strip_trailing_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Drop a leading weekday token (`"Thu, "` or `"Thu "`).
fn strip_day_of_week(s: &str) -> String {
    match s.split_once(|c: char| c == ',' || c.is_whitespace()) {
        Some((first, rest)) if WEEKDAYS.contains(&first) => {
            rest.trim_start_matches(',').trim().to_string()
        }
        _ => s.to_string(),
    }
}

/// Numeric offset for a zone abbreviation.
fn zone_offset(abbreviation: &str) -> Option<&'static str> {
    let offset = match abbreviation.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => "+0000",
        "EST" => "-0500",
        "EDT" | "AST" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        "WET" => "+0000",
        "BST" | "CET" | "WEST" => "+0100",
        "CEST" | "EET" => "+0200",
        "EEST" | "MSK" => "+0300",
        "IST" => "+0530",
        "JST" | "KST" => "+0900",
        "AEST" => "+1000",
        "AEDT" => "+1100",
        _ => return None,
    };
    Some(offset)
}

/// Swap a trailing zone abbreviation for its numeric offset.
///
/// Only the whole last token is considered, so `CEST` is never read as `EST`.
fn replace_named_tz(s: &str) -> String {
    match s.rsplit_once(' ') {
        Some((head, zone)) => match zone_offset(zone) {
            Some(offset) => format!("{head} {offset}"),
            None => s.to_string(),
        },
        None => s.to_string(),
    }
}
