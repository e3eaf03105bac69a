//! Summarize a set of downloaded files by re-reading their sizes from disk.

use std::path::PathBuf;

use tracing::warn;

use crate::model::summary::{bytes_to_mb, DownloadSummary, FileInfo};

/// Build a [`DownloadSummary`] for `paths`.
///
/// Files that vanished or cannot be stat-ed since they were written are
/// logged and left out of every total.
pub fn summarize(paths: &[PathBuf]) -> DownloadSummary {
    let mut files = Vec::with_capacity(paths.len());
    let mut total_size_bytes = 0u64;

    for path in paths {
        match std::fs::metadata(path) {
            Ok(meta) => {
                let size = meta.len();
                total_size_bytes += size;
                files.push(FileInfo {
                    path: path.clone(),
                    size,
                    size_mb: bytes_to_mb(size),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read downloaded file");
            }
        }
    }

    DownloadSummary {
        total_files: files.len(),
        total_size_bytes,
        total_size_mb: bytes_to_mb(total_size_bytes),
        files,
    }
}
