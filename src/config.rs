//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$PDFFETCH_CONFIG` (environment variable)
//! 2. `~/.config/pdffetch/config.toml` (Linux/macOS)
//!    `%APPDATA%\pdffetch\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! `DOWNLOAD_DIR`, `EMAIL_QUERY` and `GOOGLE_APPLICATION_CREDENTIALS` override
//! the matching file settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mail provider access.
    pub gmail: GmailConfig,
    /// Download target.
    pub download: DownloadConfig,
    /// Job service listener.
    pub server: ServerConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Mail provider access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// OAuth2 client secrets JSON downloaded from the Google Cloud console.
    pub credentials_file: Option<PathBuf>,
    /// Where the OAuth2 token is cached between runs.
    pub token_file: Option<PathBuf>,
    /// Search query combined with the date range.
    pub default_query: String,
    /// Maximum number of emails to process per run.
    pub max_results: u32,
}

/// Download target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory PDFs are written to.
    pub dir: PathBuf,
}

/// Job service listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            token_file: None,
            default_query: "has:attachment".to_string(),
            max_results: 100,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./downloads"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations, then apply environment
/// overrides.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    let mut config = load_config_file().unwrap_or_default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn load_config_file() -> Option<Config> {
    let path = config_file_path()?;
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                None
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            None
        }
    }
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = non_empty("DOWNLOAD_DIR") {
        config.download.dir = PathBuf::from(dir);
    }
    if let Some(query) = non_empty("EMAIL_QUERY") {
        config.gmail.default_query = query;
    }
    if let Some(creds) = non_empty("GOOGLE_APPLICATION_CREDENTIALS") {
        config.gmail.credentials_file = Some(PathBuf::from(creds));
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("PDFFETCH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("pdffetch").join("config.toml"))
}

/// Return the directory for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pdffetch")
}

/// Return the OAuth2 token cache path.
pub fn token_file_path(config: &Config) -> PathBuf {
    if let Some(ref path) = config.gmail.token_file {
        return path.clone();
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pdffetch")
        .join("token.json")
}
