//! Download PDF attachments of a batch of emails into a directory.
//!
//! Each attachment goes through fetch → name → write, and ends as an explicit
//! [`AttachmentOutcome`]. A skipped attachment is logged and never aborts the
//! rest of the batch.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{FetchError, Result};
use crate::model::attachment::AttachmentDescriptor;
use crate::model::mail::{EmailMetadata, EnrichedEmail};

use super::naming::{unique_filename, NameProbe};

/// How many names are tried when other writers keep claiming the chosen one.
const MAX_NAME_ATTEMPTS: usize = 16;

/// Capability to fetch the bytes of one attachment.
pub trait AttachmentSource {
    fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;
}

impl<F> AttachmentSource for F
where
    F: Fn(&str, &str) -> Result<Vec<u8>>,
{
    fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        self(message_id, attachment_id)
    }
}

/// Why an attachment was not written.
#[derive(Debug)]
pub enum SkipReason {
    /// The descriptor carries no attachment reference to fetch with.
    MissingReference,
    /// The fetch capability failed.
    FetchFailed(FetchError),
    /// The fetch succeeded but returned no bytes.
    EmptyContent,
    /// Writing the file failed.
    WriteFailed(FetchError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReference => write!(f, "no attachment reference"),
            Self::FetchFailed(e) => write!(f, "fetch failed: {e}"),
            Self::EmptyContent => write!(f, "empty content"),
            Self::WriteFailed(e) => write!(f, "write failed: {e}"),
        }
    }
}

/// Result of processing a single attachment.
#[derive(Debug)]
pub enum AttachmentOutcome {
    Saved(PathBuf),
    Skipped(SkipReason),
}

/// Writes PDF attachments into a target directory with collision-free names.
#[derive(Debug, Clone)]
pub struct PdfDownloader {
    download_dir: PathBuf,
}

impl PdfDownloader {
    /// Create a downloader, creating the target directory if needed.
    ///
    /// A relative directory is resolved against the current directory, so
    /// every path the downloader reports is absolute.
    pub fn new(download_dir: impl Into<PathBuf>) -> Result<Self> {
        let download_dir = download_dir.into();
        std::fs::create_dir_all(&download_dir).map_err(|e| FetchError::io(&download_dir, e))?;
        let download_dir =
            std::path::absolute(&download_dir).map_err(|e| FetchError::io(&download_dir, e))?;
        Ok(Self { download_dir })
    }

    /// The directory files are written to.
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Write `data` under a unique name derived from `filename` and `metadata`.
    ///
    /// The bytes go to a hidden temporary file first and are moved to the
    /// final name without overwriting, so a failed write never leaves a
    /// partial file at the target name.
    pub fn save_pdf(
        &self,
        data: &[u8],
        filename: &str,
        metadata: &EmailMetadata,
    ) -> Result<PathBuf> {
        self.save_with_probe(data, filename, metadata, self.download_dir.as_path())
    }

    /// Stage `data`, then claim a name chosen against `probe`.
    ///
    /// A name taken between the probe and the rename (another job writing
    /// into the same directory) is re-probed instead of failing the write.
    fn save_with_probe<P>(
        &self,
        data: &[u8],
        filename: &str,
        metadata: &EmailMetadata,
        probe: &P,
    ) -> Result<PathBuf>
    where
        P: NameProbe + ?Sized,
    {
        std::fs::create_dir_all(&self.download_dir)
            .map_err(|e| FetchError::io(&self.download_dir, e))?;

        let mut staged = stage_file(&self.download_dir, data)?;
        let now = Local::now().naive_local();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .download_dir
                .join(unique_filename(filename, metadata, now, probe));
            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    info!(path = %path.display(), "Downloaded PDF");
                    return Ok(path);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Name claimed concurrently, picking another");
                    staged = e.file;
                }
                Err(e) => return Err(FetchError::io(&path, e.error)),
            }
        }

        Err(FetchError::io(
            &self.download_dir,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("no free name for '{filename}' after {MAX_NAME_ATTEMPTS} attempts"),
            ),
        ))
    }

    /// Fetch and save one attachment of `email`.
    pub fn download_attachment(
        &self,
        email: &EnrichedEmail,
        attachment: &AttachmentDescriptor,
        source: &dyn AttachmentSource,
    ) -> AttachmentOutcome {
        let Some(attachment_id) = attachment.attachment_id.as_deref() else {
            return AttachmentOutcome::Skipped(SkipReason::MissingReference);
        };

        let data = match source.fetch_attachment(&email.message.id, attachment_id) {
            Ok(data) if data.is_empty() => {
                return AttachmentOutcome::Skipped(SkipReason::EmptyContent)
            }
            Ok(data) => data,
            Err(e) => return AttachmentOutcome::Skipped(SkipReason::FetchFailed(e)),
        };

        match self.save_pdf(&data, &attachment.filename, &email.metadata) {
            Ok(path) => AttachmentOutcome::Saved(path),
            Err(e) => AttachmentOutcome::Skipped(SkipReason::WriteFailed(e)),
        }
    }

    /// Download every attachment of every email, in order.
    ///
    /// Returns the paths that were written. Skipped attachments are logged
    /// and simply absent from the result. The progress callback receives
    /// `(emails_done, total)` before each email and once at the end;
    /// returning `false` stops before the next email.
    pub fn download_all(
        &self,
        emails: &[EnrichedEmail],
        source: &dyn AttachmentSource,
        progress: Option<&dyn Fn(usize, usize) -> bool>,
    ) -> Vec<PathBuf> {
        let mut downloaded = Vec::new();
        let total = emails.len();

        for (i, email) in emails.iter().enumerate() {
            if let Some(cb) = progress {
                if !cb(i, total) {
                    info!(done = i, total, "Download stopped by caller");
                    return downloaded;
                }
            }

            info!(
                subject = email.metadata.subject_or_default(),
                attachments = email.attachments.len(),
                "Processing email"
            );

            for attachment in &email.attachments {
                match self.download_attachment(email, attachment, source) {
                    AttachmentOutcome::Saved(path) => downloaded.push(path),
                    AttachmentOutcome::Skipped(reason) => {
                        warn!(
                            filename = %attachment.filename,
                            message_id = %email.message.id,
                            reason = %reason,
                            "Skipped attachment"
                        );
                    }
                }
            }
        }

        if let Some(cb) = progress {
            cb(total, total);
        }
        downloaded
    }
}

/// Write `data` to `target` through a temporary file in `dir`.
///
/// Fails if `target` appeared in the meantime instead of replacing it.
/// Write `data` to a hidden `.part` file in `dir`, flushed to disk.
///
/// The file is removed on drop unless it is persisted.
fn stage_file(dir: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".pdffetch-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| FetchError::io(dir, e))?;

    tmp.write_all(data)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| FetchError::io(tmp.path(), e))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::RawMessage;

    fn email(id: &str, attachments: &[(&str, Option<&str>)]) -> EnrichedEmail {
        EnrichedEmail {
            message: RawMessage {
                id: id.to_string(),
                thread_id: format!("t-{id}"),
                ..RawMessage::default()
            },
            attachments: attachments
                .iter()
                .map(|(name, aid)| AttachmentDescriptor {
                    filename: name.to_string(),
                    mime_type: "application/pdf".to_string(),
                    part_id: None,
                    size: 0,
                    attachment_id: aid.map(String::from),
                })
                .collect(),
            metadata: EmailMetadata {
                from: Some("alice@bank.com".into()),
                date: Some("Mon, 01 Jan 2024 10:00:00 +0000".into()),
                message_id: id.to_string(),
                thread_id: format!("t-{id}"),
                ..EmailMetadata::default()
            },
        }
    }

    fn source(_message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        match attachment_id {
            "boom" => Err(FetchError::Network("connection reset".into())),
            "empty" => Ok(Vec::new()),
            other => Ok(format!("%PDF-1.4 {other}").into_bytes()),
        }
    }

    #[test]
    fn test_new_creates_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("nested").join("out");
        let downloader = PdfDownloader::new(&dir).expect("downloader");
        assert!(dir.is_dir());
        assert_eq!(downloader.download_dir(), dir.as_path());
    }

    #[test]
    fn test_failed_fetch_does_not_abort_batch() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let batch = vec![
            email("m1", &[("a.pdf", Some("ok-1")), ("b.pdf", Some("boom"))]),
            email("m2", &[("c.pdf", Some("ok-2"))]),
        ];

        let paths = downloader.download_all(&batch, &source, None);
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(
            std::fs::read(&paths[1]).expect("read"),
            b"%PDF-1.4 ok-2".to_vec()
        );
    }

    #[test]
    fn test_empty_and_unreferenced_are_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let batch = vec![email(
            "m1",
            &[("a.pdf", Some("empty")), ("b.pdf", None), ("c.pdf", Some("x"))],
        )];

        let outcome = downloader.download_attachment(&batch[0], &batch[0].attachments[0], &source);
        assert!(matches!(
            outcome,
            AttachmentOutcome::Skipped(SkipReason::EmptyContent)
        ));
        let outcome = downloader.download_attachment(&batch[0], &batch[0].attachments[1], &source);
        assert!(matches!(
            outcome,
            AttachmentOutcome::Skipped(SkipReason::MissingReference)
        ));

        let paths = downloader.download_all(&batch, &source, None);
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_duplicate_names_get_counters() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let batch = vec![email(
            "m1",
            &[("Statement.pdf", Some("1")), ("Statement.pdf", Some("2"))],
        )];

        let paths = downloader.download_all(&batch, &source, None);
        let names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "20240101_100000_alice_Statement.pdf",
                "20240101_100000_alice_Statement_1.pdf"
            ]
        );
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let batch = vec![email("m1", &[("a.pdf", Some("1"))])];
        downloader.download_all(&batch, &source, None);

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_progress_can_stop_between_emails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let batch = vec![
            email("m1", &[("a.pdf", Some("1"))]),
            email("m2", &[("b.pdf", Some("2"))]),
        ];

        let stop_after_first = |done: usize, _total: usize| done < 1;
        let paths = downloader.download_all(&batch, &source, Some(&stop_after_first));
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_write_failure_is_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("out");
        let downloader = PdfDownloader::new(&dir).expect("downloader");

        // The target directory turns into a regular file after setup.
        std::fs::remove_dir(&dir).expect("remove dir");
        std::fs::write(&dir, b"not a directory").expect("write");

        let batch = vec![email("m1", &[("a.pdf", Some("1"))])];
        let outcome = downloader.download_attachment(&batch[0], &batch[0].attachments[0], &source);
        assert!(matches!(
            outcome,
            AttachmentOutcome::Skipped(SkipReason::WriteFailed(_))
        ));

        let paths = downloader.download_all(&batch, &source, None);
        assert!(paths.is_empty());
        assert_eq!(std::fs::read(&dir).expect("read"), b"not a directory");
        assert!(!dir.join("20240101_100000_alice_a.pdf").exists());
    }

    #[test]
    fn test_relative_directory_yields_absolute_paths() {
        let scratch = tempfile::tempdir_in(".").expect("tempdir");
        let relative = Path::new(scratch.path().file_name().expect("name")).join("out");
        assert!(relative.is_relative());

        let downloader = PdfDownloader::new(&relative).expect("downloader");
        assert!(downloader.download_dir().is_absolute());
        assert!(downloader.download_dir().ends_with(&relative));

        let batch = vec![email("m1", &[("a.pdf", Some("1"))])];
        let paths = downloader.download_all(&batch, &source, None);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].is_absolute());
        assert!(paths[0].exists());
    }

    /// Reports every name as free on its first call, like a directory
    /// listing taken just before another writer claimed the name.
    struct StaleOnce<'a> {
        dir: &'a Path,
        consulted: std::cell::Cell<bool>,
    }

    impl NameProbe for StaleOnce<'_> {
        fn exists(&self, name: &str) -> bool {
            if self.consulted.replace(true) {
                NameProbe::exists(self.dir, name)
            } else {
                false
            }
        }
    }

    #[test]
    fn test_name_claimed_after_probe_is_reprobed() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let taken = tmp.path().join("20240101_100000_alice_Statement.pdf");
        std::fs::write(&taken, b"other job").expect("write");

        let metadata = email("m1", &[]).metadata;
        let probe = StaleOnce {
            dir: tmp.path(),
            consulted: std::cell::Cell::new(false),
        };
        let path = downloader
            .save_with_probe(b"%PDF-1.4 mine", "Statement.pdf", &metadata, &probe)
            .expect("save");

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("20240101_100000_alice_Statement_1.pdf")
        );
        assert_eq!(std::fs::read(&taken).expect("read"), b"other job");
        assert_eq!(std::fs::read(&path).expect("read"), b"%PDF-1.4 mine");
    }

    #[test]
    fn test_concurrent_writers_into_one_directory_keep_every_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let downloader = PdfDownloader::new(tmp.path()).expect("downloader");
        let batch = vec![email(
            "m1",
            &[("Statement.pdf", Some("1")), ("Statement.pdf", Some("2"))],
        )];

        let mut all: Vec<PathBuf> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| downloader.download_all(&batch, &source, None)))
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().expect("join"))
                .collect()
        });

        assert_eq!(all.len(), 8);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|p| p.exists()));
    }
}
