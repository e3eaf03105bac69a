//! Directory browsing endpoints used to pick a download target.
//!
//! Listings skip hidden entries and put directories first, then sort by
//! case-insensitive name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use axum::extract::Query;
use axum::Json;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::model::summary::bytes_to_mb;

use super::error::ApiError;

#[derive(Debug, Serialize)]
pub struct KnownDirectory {
    pub path: PathBuf,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub exists: bool,
    pub writable: bool,
}

#[derive(Debug, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
    /// Local modification time as `YYYY-MM-DD HH:MM`, empty if unknown.
    pub modified: String,
}

#[derive(Debug, Serialize)]
pub struct DirectoryContents {
    pub path: PathBuf,
    pub contents: Vec<DirectoryEntry>,
    pub total_items: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PathValidation {
    pub path: PathBuf,
    pub exists: bool,
    /// `None` when the path does not exist.
    pub is_dir: Option<bool>,
    pub writable: bool,
    pub parent_exists: bool,
    pub parent_writable: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathBody {
    pub path: Option<String>,
}

fn required_path(path: Option<String>) -> Result<PathBuf, ApiError> {
    path.filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ApiError::bad_request("Directory path is required"))
}

/// Whether a file can be created in `dir`.
pub fn is_writable(dir: &Path) -> bool {
    dir.is_dir() && tempfile::tempfile_in(dir).is_ok()
}

/// `GET /api/directories`
pub async fn list_directories() -> Json<Vec<KnownDirectory>> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let candidates = [
        (home.join("Downloads"), "Downloads", "system"),
        (home.join("Documents"), "Documents", "system"),
        (home.join("Desktop"), "Desktop", "system"),
        (cwd.join("pdfs"), "Project PDFs", "project"),
        (cwd.join("downloads"), "Project Downloads", "project"),
    ];

    let directories = candidates
        .into_iter()
        .map(|(path, name, kind)| KnownDirectory {
            exists: path.exists(),
            writable: is_writable(&path),
            path,
            name,
            kind,
        })
        .collect();
    Json(directories)
}

/// `GET /api/directories/contents?path=`
pub async fn directory_contents(
    Query(query): Query<PathQuery>,
) -> Result<Json<DirectoryContents>, ApiError> {
    let path = required_path(query.path)?;
    if !path.exists() {
        return Err(ApiError::not_found("Directory does not exist"));
    }
    if !path.is_dir() {
        return Err(ApiError::bad_request("Path is not a directory"));
    }

    let contents = read_entries(&path).await.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => ApiError::forbidden("Permission denied accessing directory"),
        _ => ApiError::internal(e.to_string()),
    })?;

    Ok(Json(DirectoryContents {
        total_items: contents.len(),
        path,
        contents,
    }))
}

async fn read_entries(dir: &Path) -> std::io::Result<Vec<DirectoryEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        // Follows symlinks.
        let metadata = tokio::fs::metadata(&path).await.ok();
        let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());
        let size = match &metadata {
            Some(m) if !is_dir => m.len(),
            _ => 0,
        };

        entries.push(DirectoryEntry {
            name,
            is_dir,
            size,
            size_mb: (metadata.is_some() && !is_dir).then(|| bytes_to_mb(size)),
            modified: metadata
                .and_then(|m| m.modified().ok())
                .map(format_modified)
                .unwrap_or_default(),
            path,
        });
    }

    sort_entries(&mut entries);
    Ok(entries)
}

fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by_cached_key(|e| (!e.is_dir, e.name.to_lowercase()));
}

fn format_modified(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// `POST /api/directories/create`
pub async fn create_directory(Json(body): Json<PathBody>) -> Result<Json<Value>, ApiError> {
    let path = required_path(body.path)?;
    let parent = parent_of(&path);

    if !parent.exists() {
        return Err(ApiError::bad_request("Parent directory does not exist"));
    }
    if !is_writable(&parent) {
        return Err(ApiError::forbidden("No write permission to parent directory"));
    }
    if path.exists() {
        if path.is_dir() {
            return Ok(Json(json!({
                "message": "Directory already exists",
                "path": path,
            })));
        }
        return Err(ApiError::bad_request("A file with this name already exists"));
    }

    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                ApiError::forbidden("Permission denied creating directory")
            }
            _ => ApiError::internal(e.to_string()),
        })?;
    info!(path = %path.display(), "Created directory");

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Json(json!({
        "message": "Directory created successfully",
        "path": path,
        "name": name,
    })))
}

/// `POST /api/directories/validate`
pub async fn validate_directory(
    Json(body): Json<PathBody>,
) -> Result<Json<PathValidation>, ApiError> {
    let path = required_path(body.path)?;
    Ok(Json(validate_path(&path)))
}

/// Check whether `path` is usable as a download target, or can be created.
pub fn validate_path(path: &Path) -> PathValidation {
    let parent = parent_of(path);
    let exists = path.exists();
    let mut result = PathValidation {
        path: path.to_path_buf(),
        exists,
        is_dir: exists.then(|| path.is_dir()),
        writable: false,
        parent_exists: parent.exists(),
        parent_writable: false,
        valid: false,
        error: None,
    };

    if exists {
        if path.is_dir() {
            result.writable = is_writable(path);
            result.valid = result.writable;
        } else {
            result.error = Some("Path exists but is not a directory".to_string());
        }
    } else if result.parent_exists {
        result.parent_writable = is_writable(&parent);
        result.valid = result.parent_writable;
    } else {
        result.error = Some("Parent directory does not exist".to_string());
    }
    result
}

/// Parent directory, treating a bare relative name as living in `.`.
fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
