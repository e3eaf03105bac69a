//! PDF attachment discovery over a message's MIME part tree.
//!
//! The walk is a pre-order traversal following the tree's own child order, so
//! the output is stable across runs on the same input. A part that qualifies as
//! an attachment is still descended into: some `multipart/mixed` wrappers carry a
//! file name of their own and nest the real attachment below it, and both are
//! reported. Duplicate file names are reported as-is; disambiguation happens at
//! naming time.

use tracing::debug;

use crate::model::attachment::{AttachmentDescriptor, PDF_MIME_TYPE};
use crate::model::message::{Part, RawMessage};

/// Return every PDF attachment in `part` and its descendants, in pre-order.
pub fn locate_pdf_attachments(part: &Part) -> Vec<AttachmentDescriptor> {
    let mut found = Vec::new();
    walk(part, &mut found);
    found
}

/// Return the PDF attachments of a whole message.
///
/// A multipart payload is scanned through its children only; a single-part
/// payload is scanned as the candidate itself.
pub fn message_attachments(message: &RawMessage) -> Vec<AttachmentDescriptor> {
    let payload = &message.payload;
    if payload.is_container() {
        let mut found = Vec::new();
        for child in &payload.parts {
            walk(child, &mut found);
        }
        found
    } else {
        locate_pdf_attachments(payload)
    }
}

/// Whether a part is a PDF attachment candidate.
///
/// Requires a non-empty file name, and either the canonical PDF MIME type or a
/// `.pdf` suffix (case-insensitive) on the file name.
pub fn is_pdf_attachment(part: &Part) -> bool {
    let Some(filename) = part.filename.as_deref().filter(|f| !f.is_empty()) else {
        return false;
    };
    part.mime_type.as_deref() == Some(PDF_MIME_TYPE) || has_pdf_extension(filename)
}

fn has_pdf_extension(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".pdf")
}

fn walk(part: &Part, found: &mut Vec<AttachmentDescriptor>) {
    if is_pdf_attachment(part) {
        let descriptor = describe(part);
        debug!(filename = %descriptor.filename, part_id = ?descriptor.part_id, "Found PDF attachment");
        found.push(descriptor);
    }
    for child in &part.parts {
        walk(child, found);
    }
}

fn describe(part: &Part) -> AttachmentDescriptor {
    let body = part.body.as_ref();
    AttachmentDescriptor {
        filename: part.filename.clone().unwrap_or_default(),
        mime_type: part.mime_type.clone().unwrap_or_default(),
        part_id: part.part_id.clone(),
        size: body.map(|b| b.size).unwrap_or(0),
        attachment_id: body.and_then(|b| b.attachment_id.clone()),
    }
}
