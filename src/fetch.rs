//! End-to-end fetch pipeline: date range → query → search → locate → download.
//!
//! The mail provider is reached only through [`MailSource`], so the whole
//! pipeline can run against an in-memory source.

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{FetchError, Result};
use crate::export::download::{AttachmentSource, PdfDownloader};
use crate::model::mail::EnrichedEmail;
use crate::model::message::RawMessage;
use crate::parser::attachments::message_attachments;
use crate::parser::metadata::extract_metadata;

/// Input date format for the range bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Query used when the caller supplies none.
pub const DEFAULT_QUERY: &str = "has:attachment";

/// Default cap on the number of messages processed per run.
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// A mailbox that can be searched and whose attachments can be fetched.
pub trait MailSource: AttachmentSource {
    /// Return full messages matching `query`, at most `max_results` of them.
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawMessage>>;
}

/// Parameters of one fetch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub start_date: String,
    pub end_date: String,
    pub query: String,
    pub max_results: u32,
}

impl FetchRequest {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            query: DEFAULT_QUERY.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Validate the range and build the provider query for it.
    pub fn search_query(&self) -> Result<String> {
        let (start, end) = validate_date_range(&self.start_date, &self.end_date)?;
        Ok(build_date_query(start, end, &self.query))
    }
}

/// Parse both bounds as `YYYY-MM-DD` and require `start < end`.
pub fn validate_date_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate)> {
    let parse = |label: &str, value: &str| {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
            FetchError::InvalidDateRange(format!(
                "{label} date '{value}' is not in YYYY-MM-DD format"
            ))
        })
    };
    let start_date = parse("start", start)?;
    let end_date = parse("end", end)?;

    if start_date >= end_date {
        return Err(FetchError::InvalidDateRange(format!(
            "start date {start_date} must be before end date {end_date}"
        )));
    }
    Ok((start_date, end_date))
}

/// `after:YYYY/MM/DD before:YYYY/MM/DD`, prefixed by `base` when non-empty.
pub fn build_date_query(start: NaiveDate, end: NaiveDate, base: &str) -> String {
    let range = format!(
        "after:{} before:{}",
        start.format("%Y/%m/%d"),
        end.format("%Y/%m/%d")
    );
    let base = base.trim();
    if base.is_empty() {
        range
    } else {
        format!("{base} {range}")
    }
}

/// Keep only messages carrying at least one PDF, enriched with their
/// attachments and metadata. Input order is preserved.
pub fn collect_pdf_emails(messages: Vec<RawMessage>) -> Vec<EnrichedEmail> {
    messages
        .into_iter()
        .filter_map(|message| {
            let attachments = message_attachments(&message);
            if attachments.is_empty() {
                return None;
            }
            let metadata = extract_metadata(&message);
            Some(EnrichedEmail {
                message,
                attachments,
                metadata,
            })
        })
        .collect()
}

/// Run the whole pipeline and return the paths written.
///
/// The progress callback receives `(emails_done, total_emails)`; returning
/// `false` stops before the next email and returns what was saved so far.
pub fn fetch_pdfs<S: MailSource>(
    source: &S,
    downloader: &PdfDownloader,
    request: &FetchRequest,
    progress: Option<&dyn Fn(usize, usize) -> bool>,
) -> Result<Vec<PathBuf>> {
    let query = request.search_query()?;
    info!(query = %query, max_results = request.max_results, "Searching mailbox");

    let messages = source.search(&query, request.max_results)?;
    if messages.is_empty() {
        info!("No emails matched the query");
        return Ok(Vec::new());
    }

    let searched = messages.len();
    let emails = collect_pdf_emails(messages);
    if emails.is_empty() {
        info!(searched, "No PDF attachments found");
        return Ok(Vec::new());
    }
    info!(searched, with_pdfs = emails.len(), "Found emails with PDF attachments");

    Ok(downloader.download_all(&emails, source, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::{Header, Part, PartBody};
    use std::cell::RefCell;

    struct StubSource {
        messages: Vec<RawMessage>,
        queries: RefCell<Vec<String>>,
    }

    impl AttachmentSource for StubSource {
        fn fetch_attachment(&self, _message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
            Ok(format!("%PDF-{attachment_id}").into_bytes())
        }
    }

    impl MailSource for StubSource {
        fn search(&self, query: &str, _max_results: u32) -> Result<Vec<RawMessage>> {
            self.queries.borrow_mut().push(query.to_string());
            Ok(self.messages.clone())
        }
    }

    fn pdf_part(name: &str, attachment_id: &str) -> Part {
        Part {
            mime_type: Some("application/pdf".into()),
            filename: Some(name.into()),
            body: Some(PartBody {
                size: 10,
                attachment_id: Some(attachment_id.into()),
            }),
            ..Part::default()
        }
    }

    fn message(id: &str, parts: Vec<Part>) -> RawMessage {
        RawMessage {
            id: id.into(),
            thread_id: format!("t-{id}"),
            payload: Part {
                mime_type: Some("multipart/mixed".into()),
                headers: vec![
                    Header::new("From", "Alice <alice@bank.com>"),
                    Header::new("Date", "Mon, 01 Jan 2024 10:00:00 +0000"),
                ],
                parts,
                ..Part::default()
            },
        }
    }

    #[test]
    fn test_validate_date_range_ok() {
        let (s, e) = validate_date_range("2024-01-01", "2024-01-31").expect("valid");
        assert!(s < e);
    }

    #[test]
    fn test_validate_date_range_rejects_bad_format() {
        let err = validate_date_range("01/01/2024", "2024-01-31").unwrap_err();
        assert!(matches!(err, FetchError::InvalidDateRange(_)));
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_validate_date_range_rejects_reversed_and_equal() {
        assert!(validate_date_range("2024-02-01", "2024-01-01").is_err());
        assert!(validate_date_range("2024-01-01", "2024-01-01").is_err());
    }

    #[test]
    fn test_build_date_query() {
        let (s, e) = validate_date_range("2024-01-01", "2024-01-31").expect("valid");
        assert_eq!(
            build_date_query(s, e, "has:attachment"),
            "has:attachment after:2024/01/01 before:2024/01/31"
        );
        assert_eq!(build_date_query(s, e, "  "), "after:2024/01/01 before:2024/01/31");
    }

    #[test]
    fn test_collect_keeps_only_pdf_emails_in_order() {
        let plain = RawMessage {
            id: "plain".into(),
            ..RawMessage::default()
        };
        let messages = vec![
            message("a", vec![pdf_part("a.pdf", "att-a")]),
            plain,
            message("b", vec![pdf_part("b.pdf", "att-b")]),
        ];
        let emails = collect_pdf_emails(messages);
        let ids: Vec<&str> = emails.iter().map(|e| e.message.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(emails[0].metadata.thread_id, "t-a");
        assert_eq!(emails[1].attachments[0].filename, "b.pdf");
    }

    #[test]
    fn test_fetch_pdfs_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(dir.path()).expect("downloader");
        let source = StubSource {
            messages: vec![message("m1", vec![pdf_part("Statement.pdf", "x1")])],
            queries: RefCell::new(Vec::new()),
        };
        let request = FetchRequest::new("2024-01-01", "2024-02-01");

        let paths = fetch_pdfs(&source, &downloader, &request, None).expect("fetch");
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0].file_name().and_then(|n| n.to_str()),
            Some("20240101_100000_alice_Statement.pdf")
        );
        assert_eq!(std::fs::read(&paths[0]).expect("read"), b"%PDF-x1");
        assert_eq!(
            source.queries.borrow().as_slice(),
            ["has:attachment after:2024/01/01 before:2024/02/01"]
        );
    }

    #[test]
    fn test_fetch_pdfs_invalid_range_does_not_search() {
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(dir.path()).expect("downloader");
        let source = StubSource {
            messages: Vec::new(),
            queries: RefCell::new(Vec::new()),
        };
        let request = FetchRequest::new("2024-03-01", "2024-02-01");
        assert!(fetch_pdfs(&source, &downloader, &request, None).is_err());
        assert!(source.queries.borrow().is_empty());
    }

    #[test]
    fn test_fetch_pdfs_without_pdfs_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(dir.path()).expect("downloader");
        let source = StubSource {
            messages: vec![RawMessage {
                id: "plain".into(),
                ..RawMessage::default()
            }],
            queries: RefCell::new(Vec::new()),
        };
        let request = FetchRequest::new("2024-01-01", "2024-02-01");
        let paths = fetch_pdfs(&source, &downloader, &request, None).expect("fetch");
        assert!(paths.is_empty());
    }

    #[test]
    fn test_fetch_pdfs_cancelled_by_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(dir.path()).expect("downloader");
        let source = StubSource {
            messages: vec![
                message("m1", vec![pdf_part("one.pdf", "x1")]),
                message("m2", vec![pdf_part("two.pdf", "x2")]),
            ],
            queries: RefCell::new(Vec::new()),
        };
        let request = FetchRequest::new("2024-01-01", "2024-02-01");
        let stop_after_first = |done: usize, _total: usize| done < 1;
        let paths =
            fetch_pdfs(&source, &downloader, &request, Some(&stop_after_first)).expect("fetch");
        assert_eq!(paths.len(), 1);
    }
}
