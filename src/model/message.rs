//! Raw message structures as delivered by the mail provider.
//!
//! These mirror the Gmail API `users.messages` resource (`format=full`) closely
//! enough to deserialize it directly. Only the fields the pipeline reads are kept.

use serde::{Deserialize, Serialize};

/// A full message from the provider: identifiers plus the MIME part tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Provider message identifier (used to fetch attachment bytes).
    pub id: String,

    /// Provider thread identifier.
    #[serde(default)]
    pub thread_id: String,

    /// Root of the MIME part tree. Headers live on this part.
    #[serde(default)]
    pub payload: Part,
}

/// A node of the MIME body structure.
///
/// A part with an empty `parts` list is a leaf; otherwise it is a container.
/// Both kinds may carry a file name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Provider part identifier (`"0"`, `"1.2"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,

    /// Declared MIME type, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// File name, empty or absent for non-attachment parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Headers declared on this part, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,

    /// Body descriptor: size and attachment reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PartBody>,

    /// Nested parts, in declared order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Part>,
}

/// Size and location of a part's content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    /// Decoded size in bytes as reported by the provider.
    #[serde(default)]
    pub size: u64,

    /// Opaque reference used to fetch the bytes later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
}

/// A single `name: value` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Part {
    /// Whether this part has nested children.
    pub fn is_container(&self) -> bool {
        !self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_provider_shape() {
        let json = r#"{
            "id": "18c1",
            "threadId": "18c0",
            "payload": {
                "partId": "",
                "mimeType": "multipart/mixed",
                "filename": "",
                "headers": [{"name": "Subject", "value": "Invoice"}],
                "body": {"size": 0},
                "parts": [
                    {
                        "partId": "1",
                        "mimeType": "application/pdf",
                        "filename": "invoice.pdf",
                        "body": {"size": 2048, "attachmentId": "ANGjdJ8"}
                    }
                ]
            }
        }"#;
        let msg: RawMessage = serde_json::from_str(json).expect("parse");
        assert_eq!(msg.id, "18c1");
        assert_eq!(msg.thread_id, "18c0");
        assert!(msg.payload.is_container());
        assert_eq!(msg.payload.headers[0], Header::new("Subject", "Invoice"));

        let pdf = &msg.payload.parts[0];
        assert!(!pdf.is_container());
        let body = pdf.body.as_ref().expect("body");
        assert_eq!(body.size, 2048);
        assert_eq!(body.attachment_id.as_deref(), Some("ANGjdJ8"));
    }

    #[test]
    fn test_missing_fields_default() {
        let msg: RawMessage = serde_json::from_str(r#"{"id": "1"}"#).expect("parse");
        assert!(msg.thread_id.is_empty());
        assert!(msg.payload.parts.is_empty());
        assert!(msg.payload.filename.is_none());
    }
}
