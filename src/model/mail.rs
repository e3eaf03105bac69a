//! Per-message metadata and the enriched record consumed by the downloader.

use serde::{Deserialize, Serialize};

use super::attachment::AttachmentDescriptor;
use super::message::RawMessage;

/// Normalized header fields of a single message.
///
/// Derived once per message and read-only afterwards. Header-backed fields are
/// `None` when the header is missing; the identifiers always come from the
/// message itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMetadata {
    /// Raw `From:` header value.
    pub from: Option<String>,

    /// Raw `To:` header value.
    pub to: Option<String>,

    /// Raw `Subject:` header value.
    pub subject: Option<String>,

    /// Raw `Date:` header value (RFC 2822 style, possibly malformed).
    pub date: Option<String>,

    /// Provider message identifier.
    pub message_id: String,

    /// Provider thread identifier.
    pub thread_id: String,
}

impl EmailMetadata {
    /// Subject for log lines.
    pub fn subject_or_default(&self) -> &str {
        self.subject.as_deref().unwrap_or("No subject")
    }
}

/// A message together with its PDF attachments and metadata.
#[derive(Debug, Clone)]
pub struct EnrichedEmail {
    pub message: RawMessage,
    pub attachments: Vec<AttachmentDescriptor>,
    pub metadata: EmailMetadata,
}
