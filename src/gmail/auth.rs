//! OAuth2 for the Gmail API: token storage, refresh, and the installed-app
//! consent flow.
//!
//! Tokens live in a JSON file with `0600` permissions on Unix. The client id
//! and secret are stored next to the token so a later refresh needs only the
//! token file.

use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FetchError, Result};

/// Read-only mailbox access.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Seconds before the real expiry at which a token counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

// ── Token ───────────────────────────────────────────────────────

/// A stored OAuth2 token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// `None` means unknown, which is treated as expired.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl OAuthToken {
    /// Whether the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() >= exp - Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }

    /// Whether the token carries everything needed for a refresh.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some()
    }
}

/// Show the first 4 characters of a secret, mask the rest.
fn mask(secret: &str) -> String {
    match secret.get(..4) {
        Some(head) if secret.len() > 4 => format!("{head}***"),
        _ => "***".to_string(),
    }
}

impl fmt::Display for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OAuthToken(access={}, refresh={}, expires_at={:?})",
            mask(&self.access_token),
            self.refresh_token.as_deref().map(mask).unwrap_or_default(),
            self.expires_at,
        )
    }
}

/// Body of a successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ── Token store ─────────────────────────────────────────────────

/// JSON file holding one [`OAuthToken`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the token; `Ok(None)` when the file does not exist.
    pub fn load(&self) -> Result<Option<OAuthToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| FetchError::io(&self.path, e))?;
        let token: OAuthToken = serde_json::from_str(&content)?;
        debug!(path = %self.path.display(), expires_at = ?token.expires_at, "Loaded token");
        Ok(Some(token))
    }

    /// Save the token, creating parent directories, with owner-only access.
    pub fn save(&self, token: &OAuthToken) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, content).map_err(|e| FetchError::io(&self.path, e))?;
        restrict_permissions(&self.path)?;
        debug!(path = %self.path.display(), "Saved token");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| FetchError::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ── Client secrets ──────────────────────────────────────────────

/// OAuth2 client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a client secrets document with an `installed` or `web` section.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        file.installed.or(file.web).ok_or_else(|| {
            FetchError::Config(
                "client secrets file has neither an \"installed\" nor a \"web\" section".into(),
            )
        })
    }

    /// Load client secrets from `path`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.ok_or(FetchError::MissingCredentials)?;
        if !path.exists() {
            return Err(FetchError::CredentialsNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| FetchError::io(path, e))?;
        Self::from_json(&content)
    }
}

// ── Authenticator ───────────────────────────────────────────────

/// Produces a valid access token: cached, refreshed, or freshly consented.
pub struct Authenticator {
    credentials_file: Option<PathBuf>,
    store: TokenStore,
    http: Client,
}

impl Authenticator {
    pub fn new(credentials_file: Option<PathBuf>, store: TokenStore) -> Self {
        Self {
            credentials_file,
            store,
            http: Client::new(),
        }
    }

    /// Return a token that is valid right now.
    pub fn authenticate(&self) -> Result<OAuthToken> {
        if let Some(token) = self.store.load()? {
            if !token.is_expired() {
                return Ok(token);
            }
            if token.can_refresh() {
                info!("Refreshing expired credentials");
                match self.refresh(&token) {
                    Ok(fresh) => {
                        self.store.save(&fresh)?;
                        return Ok(fresh);
                    }
                    Err(e) => warn!(error = %e, "Token refresh failed, starting consent flow"),
                }
            }
        }

        let secrets = ClientSecrets::load(self.credentials_file.as_deref())?;
        info!("Starting OAuth2 flow");
        let token = self.run_installed_flow(&secrets)?;
        self.store.save(&token)?;
        info!(path = %self.store.path().display(), "Credentials saved");
        Ok(token)
    }

    fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let (Some(refresh_token), Some(client_id)) =
            (token.refresh_token.as_deref(), token.client_id.as_deref())
        else {
            return Err(FetchError::Auth("token cannot be refreshed".into()));
        };
        let client_secret = token.client_secret.as_deref().unwrap_or_default();
        let token_uri = token.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

        let response = self.request_token(
            token_uri,
            &[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )?;

        Ok(OAuthToken {
            access_token: response.access_token,
            // Google may or may not rotate the refresh token.
            refresh_token: response
                .refresh_token
                .or_else(|| token.refresh_token.clone()),
            expires_at: response.expires_in.map(expires_at),
            client_id: token.client_id.clone(),
            client_secret: token.client_secret.clone(),
            token_uri: token.token_uri.clone(),
        })
    }

    fn run_installed_flow(&self, secrets: &ClientSecrets) -> Result<OAuthToken> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .map_err(|e| FetchError::Auth(format!("cannot start loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| FetchError::Auth(format!("cannot start loopback listener: {e}")))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}");
        let state = uuid::Uuid::new_v4().simple().to_string();

        let auth_url = authorization_url(secrets, &redirect_uri, &state)?;
        eprintln!("Please visit this URL to authorize access to Gmail:\n\n{auth_url}\n");

        let code = receive_code(&listener, &state)?;
        let response = self.request_token(
            &secrets.token_uri,
            &[
                ("code", code.as_str()),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ],
        )?;

        Ok(OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_in.map(expires_at),
            client_id: Some(secrets.client_id.clone()),
            client_secret: Some(secrets.client_secret.clone()),
            token_uri: Some(secrets.token_uri.clone()),
        })
    }

    fn request_token(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let resp = self.http.post(endpoint).form(form).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().unwrap_or_default();
            let reason = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(FetchError::Auth(format!(
                "token endpoint returned {status}: {reason}"
            )));
        }
        Ok(resp.json()?)
    }
}

fn expires_at(expires_in: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in)
}

/// Build the consent page URL for the installed-app flow.
pub fn authorization_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", GMAIL_READONLY_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| FetchError::Config(format!("invalid auth_uri '{}': {e}", secrets.auth_uri)))
}

/// Wait for the browser redirect on `listener` and return the authorization code.
fn receive_code(listener: &TcpListener, expected_state: &str) -> Result<String> {
    let (mut stream, _) = listener
        .accept()
        .map_err(|e| FetchError::Auth(format!("loopback redirect failed: {e}")))?;

    let mut request_line = String::new();
    BufReader::new(&stream)
        .read_line(&mut request_line)
        .map_err(|e| FetchError::Auth(format!("loopback redirect failed: {e}")))?;

    let outcome = parse_redirect(&request_line, expected_state);
    let page = match &outcome {
        Ok(_) => "The authentication flow has completed. You may close this window.",
        Err(_) => "Authentication failed. Return to the terminal for details.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
        page.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!(error = %e, "Could not answer the browser");
    }
    outcome
}

/// Extract the authorization code from a redirect request line such as
/// `GET /?state=..&code=.. HTTP/1.1`.
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| FetchError::Auth("malformed redirect request".into()))?;
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| FetchError::Auth(format!("malformed redirect request: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(FetchError::Auth(format!("consent denied: {value}"))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(FetchError::Auth("state mismatch in redirect".into()));
    }
    code.ok_or_else(|| FetchError::Auth("redirect carried no authorization code".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: Option<DateTime<Utc>>) -> OAuthToken {
        OAuthToken {
            access_token: "ya29.access".into(),
            refresh_token: Some("1//refresh".into()),
            expires_at,
            client_id: Some("id.apps.googleusercontent.com".into()),
            client_secret: Some("secret".into()),
            token_uri: None,
        }
    }

    #[test]
    fn test_expiry_detection() {
        assert!(!token(Some(Utc::now() + Duration::hours(1))).is_expired());
        assert!(token(Some(Utc::now() - Duration::hours(1))).is_expired());
        assert!(token(Some(Utc::now() + Duration::seconds(30))).is_expired());
        assert!(token(None).is_expired());
    }

    #[test]
    fn test_display_masks_secrets() {
        let text = token(None).to_string();
        assert!(text.contains("ya29***"));
        assert!(!text.contains("ya29.access"));
        assert!(!text.contains("1//refresh"));
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));
        assert_eq!(store.load().expect("load"), None);

        let original = token(Some(Utc::now() + Duration::hours(1)));
        store.save(&original).expect("save");
        assert_eq!(store.load().expect("load"), Some(original));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_minimal_token_json() {
        let token: OAuthToken =
            serde_json::from_str(r#"{"access_token":"abc"}"#).expect("parse");
        assert_eq!(token.refresh_token, None);
        assert!(token.is_expired());
        assert!(!token.can_refresh());
    }

    #[test]
    fn test_client_secrets_installed_and_web() {
        let installed = r#"{"installed":{"client_id":"cid","client_secret":"cs"}}"#;
        let secrets = ClientSecrets::from_json(installed).expect("installed");
        assert_eq!(secrets.client_id, "cid");
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);

        let web = r#"{"web":{"client_id":"w","client_secret":"s","token_uri":"https://t.example/token"}}"#;
        let secrets = ClientSecrets::from_json(web).expect("web");
        assert_eq!(secrets.token_uri, "https://t.example/token");

        assert!(matches!(
            ClientSecrets::from_json(r#"{"other":{}}"#),
            Err(FetchError::Config(_))
        ));
    }

    #[test]
    fn test_client_secrets_missing_file() {
        assert!(matches!(
            ClientSecrets::load(None),
            Err(FetchError::MissingCredentials)
        ));
        let missing = Path::new("/nonexistent/credentials.json");
        assert!(matches!(
            ClientSecrets::load(Some(missing)),
            Err(FetchError::CredentialsNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn test_authorization_url_parameters() {
        let secrets = ClientSecrets::from_json(
            r#"{"installed":{"client_id":"cid","client_secret":"cs"}}"#,
        )
        .expect("secrets");
        let url = authorization_url(&secrets, "http://127.0.0.1:8765", "st").expect("url");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".into(), GMAIL_READONLY_SCOPE.into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://127.0.0.1:8765".into())));
        assert!(pairs.contains(&("state".into(), "st".into())));
    }

    #[test]
    fn test_parse_redirect() {
        let code = parse_redirect("GET /?state=abc&code=4%2F0Ab HTTP/1.1\r\n", "abc")
            .expect("code");
        assert_eq!(code, "4/0Ab");

        assert!(parse_redirect("GET /?state=zzz&code=x HTTP/1.1", "abc").is_err());
        assert!(parse_redirect("GET /?error=access_denied&state=abc HTTP/1.1", "abc").is_err());
        assert!(parse_redirect("GET /?state=abc HTTP/1.1", "abc").is_err());
        assert!(parse_redirect("", "abc").is_err());
    }
}
