//! Header metadata extraction.

use crate::model::mail::EmailMetadata;
use crate::model::message::RawMessage;

/// Extract normalized metadata from a message's top-level headers.
///
/// Header names match case-insensitively. When a header repeats, the last
/// occurrence wins. Missing headers leave the field `None`; the identifiers
/// always come from the message itself.
pub fn extract_metadata(message: &RawMessage) -> EmailMetadata {
    let mut metadata = EmailMetadata {
        message_id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        ..EmailMetadata::default()
    };

    for header in &message.payload.headers {
        let slot = match header.name.to_ascii_lowercase().as_str() {
            "from" => &mut metadata.from,
            "to" => &mut metadata.to,
            "subject" => &mut metadata.subject,
            "date" => &mut metadata.date,
            _ => continue,
        };
        *slot = Some(header.value.clone());
    }

    metadata
}
