//! Collision-free, context-rich file names for downloaded PDFs.
//!
//! Format: `{YYYYMMDD_HHMMSS}_{sender}_{name}.pdf`, with `_{n}` inserted
//! before the extension when the name is already taken in the target directory.
//!
//! Everything here is a pure transformation except the existence probe, which
//! is abstracted behind [`NameProbe`]. The fallback clock is passed in as
//! `now`. The probe is only a snapshot: `PdfDownloader` re-probes when another
//! writer claims a name first.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::model::mail::EmailMetadata;
use crate::parser::date::parse_email_date;

/// Placeholder base name for attachments whose name sanitizes to nothing.
pub const UNNAMED_PDF: &str = "unnamed_pdf";

/// Sender token used when the message has no usable `From:` header.
pub const UNKNOWN_SENDER: &str = "unknown";

/// `strftime` format of the timestamp prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Characters that are not allowed in file names on common filesystems.
const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Answers whether a file name is already taken in the target directory.
pub trait NameProbe {
    fn exists(&self, name: &str) -> bool;
}

impl NameProbe for Path {
    fn exists(&self, name: &str) -> bool {
        self.join(name).exists()
    }
}

impl NameProbe for HashSet<String> {
    fn exists(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Replace every filesystem-reserved character with `_`.
pub fn replace_invalid_chars(s: &str) -> String {
    s.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Sanitize an attachment file name.
///
/// Reserved characters become `_`, leading/trailing spaces and dots are
/// stripped, an empty result becomes [`UNNAMED_PDF`], and `.pdf` is appended
/// unless the name already ends with it (case-insensitive).
pub fn sanitize_filename(filename: &str) -> String {
    let replaced = replace_invalid_chars(filename);
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');

    let mut name = if trimmed.is_empty() {
        UNNAMED_PDF.to_string()
    } else {
        trimmed.to_string()
    };
    if !name.to_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}

/// Timestamp prefix from a raw `Date:` header.
///
/// An absent or unparseable header falls back to `now`; this never fails.
pub fn timestamp_prefix(date_header: Option<&str>, now: NaiveDateTime) -> String {
    match date_header.and_then(parse_email_date) {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

/// Sender token from a raw `From:` header: everything before the first `@`.
///
/// The header is used as-is, display name included, so
/// `"Alice <alice@bank.com>"` gives `Alice _alice`. A value without `@` is used
/// whole. Only an absent header gives [`UNKNOWN_SENDER`].
pub fn sender_token(from_header: Option<&str>) -> String {
    let Some(from) = from_header else {
        return UNKNOWN_SENDER.to_string();
    };
    let local = from.split_once('@').map_or(from, |(local, _)| local);
    replace_invalid_chars(local)
}

/// Join prefix, sender and sanitized name, keeping the last extension as a
/// distinct suffix.
pub fn compose_filename(timestamp: &str, sender: &str, sanitized: &str) -> String {
    match sanitized.rsplit_once('.') {
        Some((name, ext)) => format!("{timestamp}_{sender}_{name}.{ext}"),
        None => format!("{timestamp}_{sender}_{sanitized}"),
    }
}

/// Insert `_{counter}` before the last extension (or at the end if none).
fn with_counter(filename: &str, counter: u64) -> String {
    match filename.rsplit_once('.') {
        Some((name, ext)) => format!("{name}_{counter}.{ext}"),
        None => format!("{filename}_{counter}"),
    }
}

/// Produce a file name for `raw_filename` that does not exist in the target
/// directory at call time.
///
/// The counter starts at 1 and increases by one per collision; every
/// candidate is derived from the same composed name.
pub fn unique_filename<P>(
    raw_filename: &str,
    metadata: &EmailMetadata,
    now: NaiveDateTime,
    probe: &P,
) -> String
where
    P: NameProbe + ?Sized,
{
    let sanitized = sanitize_filename(raw_filename);
    let timestamp = timestamp_prefix(metadata.date.as_deref(), now);
    let sender = sender_token(metadata.from.as_deref());
    let composed = compose_filename(&timestamp, &sender, &sanitized);

    let mut candidate = composed.clone();
    let mut counter: u64 = 1;
    while probe.exists(&candidate) {
        candidate = with_counter(&composed, counter);
        counter += 1;
    }
    candidate
}
