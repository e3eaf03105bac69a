//! HTTP job service.
//!
//! Each `POST /api/fetch` becomes a job executed on a blocking worker, while
//! clients poll `/api/status/{job_id}` for progress and collect results.

pub mod directories;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod runner;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use self::jobs::JobStore;
use self::runner::FetchRunner;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub runner: Arc<dyn FetchRunner>,
    /// Target directory when a request names none.
    pub download_dir: PathBuf,
    /// Query when a request names none.
    pub default_query: String,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/fetch", post(handlers::start_fetch))
        .route("/api/status/{job_id}", get(handlers::job_status))
        .route("/api/results/{job_id}", get(handlers::job_results))
        .route("/api/download/{job_id}/{filename}", get(handlers::download_file))
        .route("/api/directories", get(directories::list_directories))
        .route("/api/directories/contents", get(directories::directory_contents))
        .route("/api/directories/create", post(directories::create_directory))
        .route("/api/directories/validate", post(directories::validate_directory))
        .route("/api/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind {addr}"))?;
    info!(%addr, "Job service listening");
    axum::serve(listener, router(state))
        .await
        .context("Server terminated")?;
    Ok(())
}
