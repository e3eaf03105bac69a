//! Execution of a single fetch job on a blocking worker.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::Result;
use crate::export::download::PdfDownloader;
use crate::export::summary::summarize;
use crate::fetch::{fetch_pdfs, FetchRequest, MailSource};
use crate::gmail;

use super::jobs::{JobResults, JobStore};

/// Progress once the mailbox is authenticated.
pub const PROGRESS_AUTHENTICATED: u8 = 10;
/// Progress when the search starts.
pub const PROGRESS_SEARCHING: u8 = 20;
/// Progress when every email has been processed.
pub const PROGRESS_DOWNLOADED: u8 = 95;

/// Everything a worker needs to run one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub fetch: FetchRequest,
    pub download_dir: PathBuf,
}

/// Receives `(percent, message)` milestones while a job runs.
pub type ProgressFn<'a> = &'a (dyn Fn(u8, &str) + Sync);

/// Runs one job to completion. Called on a blocking thread.
pub trait FetchRunner: Send + Sync {
    fn run(&self, request: &JobRequest, progress: ProgressFn<'_>) -> Result<JobResults>;
}

/// Map `(emails_done, total)` onto the downloading band of the progress bar.
pub fn download_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_DOWNLOADED;
    }
    let span = usize::from(PROGRESS_DOWNLOADED - PROGRESS_SEARCHING);
    let step = span * done.min(total) / total;
    PROGRESS_SEARCHING + u8::try_from(step).unwrap_or(PROGRESS_DOWNLOADED - PROGRESS_SEARCHING)
}

/// Run the pipeline against `source` and summarize what was written.
pub fn run_with_source<S: MailSource>(
    source: &S,
    request: &JobRequest,
    progress: ProgressFn<'_>,
) -> Result<JobResults> {
    progress(PROGRESS_SEARCHING, "Searching for emails...");
    let downloader = PdfDownloader::new(&request.download_dir)?;

    let on_email = |done: usize, total: usize| {
        progress(
            download_progress(done, total),
            &format!("Downloading PDFs ({done}/{total} emails)"),
        );
        true
    };
    let files = fetch_pdfs(source, &downloader, &request.fetch, Some(&on_email))?;

    Ok(JobResults {
        summary: summarize(&files),
        files,
        download_dir: downloader.download_dir().to_path_buf(),
    })
}

/// Production runner: authenticates against Gmail for every job.
#[derive(Debug, Clone)]
pub struct GmailRunner {
    pub credentials_file: Option<PathBuf>,
    pub token_file: PathBuf,
}

impl FetchRunner for GmailRunner {
    fn run(&self, request: &JobRequest, progress: ProgressFn<'_>) -> Result<JobResults> {
        progress(0, "Authenticating with Gmail...");
        let client = gmail::connect(self.credentials_file.clone(), self.token_file.clone())?;
        progress(PROGRESS_AUTHENTICATED, "Authenticated");
        run_with_source(&client, request, progress)
    }
}

/// Drive `job_id` through its lifecycle, recording every transition in `store`.
pub fn execute_job(
    store: Arc<dyn JobStore>,
    runner: Arc<dyn FetchRunner>,
    job_id: &str,
    request: &JobRequest,
) {
    store.update(job_id, &mut |job| job.advance(0, "Starting..."));

    let report = |percent: u8, message: &str| {
        store.update(job_id, &mut |job| job.advance(percent, message));
    };

    match runner.run(request, &report) {
        Ok(results) => {
            info!(job_id, files = results.files.len(), "Job completed");
            store.update(job_id, &mut |job| job.complete(results.clone()));
        }
        Err(e) => {
            error!(job_id, error = %e, "Job failed");
            let message = e.to_string();
            store.update(job_id, &mut |job| job.fail(message.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::server::jobs::{InMemoryJobStore, Job, JobStatus};
    use std::sync::Mutex;

    struct FailingRunner;

    impl FetchRunner for FailingRunner {
        fn run(&self, _request: &JobRequest, progress: ProgressFn<'_>) -> Result<JobResults> {
            progress(PROGRESS_AUTHENTICATED, "Authenticated");
            Err(FetchError::Auth("consent denied".into()))
        }
    }

    struct RecordingRunner {
        seen: Mutex<Vec<u8>>,
    }

    impl FetchRunner for RecordingRunner {
        fn run(&self, request: &JobRequest, progress: ProgressFn<'_>) -> Result<JobResults> {
            for p in [PROGRESS_AUTHENTICATED, PROGRESS_SEARCHING, 50] {
                progress(p, "step");
                self.seen.lock().expect("lock").push(p);
            }
            Ok(JobResults {
                files: Vec::new(),
                summary: summarize(&[]),
                download_dir: request.download_dir.clone(),
            })
        }
    }

    fn request() -> JobRequest {
        JobRequest {
            fetch: FetchRequest::new("2024-01-01", "2024-02-01"),
            download_dir: PathBuf::from("/tmp/pdfs"),
        }
    }

    #[test]
    fn test_download_progress_band() {
        assert_eq!(download_progress(0, 4), 20);
        assert_eq!(download_progress(2, 4), 57);
        assert_eq!(download_progress(4, 4), 95);
        assert_eq!(download_progress(0, 0), 95);
        assert_eq!(download_progress(9, 4), 95);
    }

    #[test]
    fn test_execute_job_success() {
        let store = Arc::new(InMemoryJobStore::new());
        store.create(Job::new("ok"));
        let runner = Arc::new(RecordingRunner {
            seen: Mutex::new(Vec::new()),
        });

        execute_job(store.clone(), runner.clone(), "ok", &request());

        let job = store.get("ok").expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(
            job.results.expect("results").download_dir,
            PathBuf::from("/tmp/pdfs")
        );
        assert_eq!(*runner.seen.lock().expect("lock"), [10, 20, 50]);
    }

    #[test]
    fn test_execute_job_failure() {
        let store = Arc::new(InMemoryJobStore::new());
        store.create(Job::new("bad"));

        execute_job(store.clone(), Arc::new(FailingRunner), "bad", &request());

        let job = store.get("bad").expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, PROGRESS_AUTHENTICATED);
        assert!(job.error.expect("error").contains("consent denied"));
        assert!(job.results.is_none());
    }
}
