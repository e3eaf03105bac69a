//! Centralized error types for pdffetch.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the pdffetch library.
#[derive(Error, Debug)]
pub enum FetchError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The OAuth client secrets file does not exist.
    #[error("Credentials file not found: {0}")]
    CredentialsNotFound(PathBuf),

    /// No credentials file was configured and no usable token is stored.
    #[error(
        "No credentials file specified. Set GOOGLE_APPLICATION_CREDENTIALS or pass --credentials"
    )]
    MissingCredentials,

    /// Authentication with the mail provider failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The mail provider answered with a non-success status.
    #[error("Mail API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A transport-level failure talking to the mail provider.
    #[error("Network error: {0}")]
    Network(String),

    /// A payload could not be decoded (JSON, base64, ...).
    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested date range is malformed or inverted.
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// The configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, FetchError>`.
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying with fresh credentials could fix this error.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::MissingCredentials | Self::CredentialsNotFound(_)
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `FetchError::io`).
impl From<std::io::Error> for FetchError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
