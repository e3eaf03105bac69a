//! Background fetch jobs and where they are kept.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::model::summary::DownloadSummary;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Output of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub files: Vec<PathBuf>,
    pub summary: DownloadSummary,
    pub download_dir: PathBuf,
}

/// A fetch job as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: String,
    pub status: JobStatus,
    /// Percentage, 0 to 100.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<JobResults>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0,
            message: "Initializing...".to_string(),
            error: None,
            results: None,
        }
    }

    /// Move to `Running` with a progress milestone.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) {
        self.status = JobStatus::Running;
        self.progress = progress.min(100);
        self.message = message.into();
    }

    pub fn complete(&mut self, results: JobResults) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = format!("Successfully downloaded {} PDF files", results.files.len());
        self.results = Some(results);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.status = JobStatus::Failed;
        self.message = format!("Error: {error}");
        self.error = Some(error);
    }
}

/// Storage for jobs shared between request handlers and workers.
pub trait JobStore: Send + Sync {
    fn create(&self, job: Job);

    fn get(&self, id: &str) -> Option<Job>;

    /// Apply `f` to the stored job. Returns `false` if the id is unknown.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Job)) -> bool;
}

/// Process-local job store. Jobs are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job.id.clone(), job);
    }

    fn get(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).cloned()
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }
}
