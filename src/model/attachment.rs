//! Attachment descriptors.
//!
//! A descriptor only carries metadata and an opaque reference. The bytes are
//! fetched later, once, by the downloader.

/// Canonical MIME type for PDF documents.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A PDF attachment located in a message's part tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentDescriptor {
    /// File name exactly as declared on the part.
    pub filename: String,

    /// Declared MIME type (empty if the part declared none).
    pub mime_type: String,

    /// Provider part identifier, if any.
    pub part_id: Option<String>,

    /// Size reported by the provider; `0` when unknown.
    pub size: u64,

    /// Opaque reference for fetching the bytes. Absent for inline bodies.
    pub attachment_id: Option<String>,
}
