//! Job endpoints: start, status, results, file download, health.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::fetch::{validate_date_range, FetchRequest, DEFAULT_MAX_RESULTS};

use super::error::ApiError;
use super::jobs::{Job, JobResults};
use super::runner::{execute_job, JobRequest};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct StartFetchBody {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub query: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartFetchResponse {
    pub job_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

/// `POST /api/fetch`
pub async fn start_fetch(
    State(state): State<AppState>,
    Json(body): Json<StartFetchBody>,
) -> Result<Json<StartFetchResponse>, ApiError> {
    let (Some(start_date), Some(end_date)) = (
        body.start_date.filter(|s| !s.is_empty()),
        body.end_date.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Start date and end date are required"));
    };
    validate_date_range(&start_date, &end_date)?;

    let request = JobRequest {
        fetch: FetchRequest {
            start_date,
            end_date,
            query: body
                .query
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| state.default_query.clone()),
            max_results: body.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        },
        download_dir: body
            .download_dir
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| state.download_dir.clone()),
    };

    let job_id = format!("job_{}", Uuid::new_v4().simple());
    state.jobs.create(Job::new(job_id.clone()));
    info!(job_id = %job_id, dir = %request.download_dir.display(), "Starting fetch job");

    let jobs = state.jobs.clone();
    let runner = state.runner.clone();
    let id = job_id.clone();
    tokio::task::spawn_blocking(move || execute_job(jobs, runner, &id, &request));

    Ok(Json(StartFetchResponse {
        job_id,
        status: "started",
        message: "PDF fetch job started",
    }))
}

/// `GET /api/status/{job_id}`
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .jobs
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

/// `GET /api/results/{job_id}`
pub async fn job_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResults>, ApiError> {
    state
        .jobs
        .get(&job_id)
        .and_then(|job| job.results)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Results not found"))
}

/// `GET /api/download/{job_id}/{filename}`
///
/// Only files recorded in the job's results can be served.
pub async fn download_file(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let results = state
        .jobs
        .get(&job_id)
        .and_then(|job| job.results)
        .ok_or_else(|| ApiError::not_found("Job results not found"))?;

    let path = results
        .files
        .iter()
        .find(|f| f.file_name().is_some_and(|n| n == filename.as_str()))
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Local::now().to_rfc3339(),
    }))
}
