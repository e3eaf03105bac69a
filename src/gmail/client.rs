//! Blocking Gmail REST API v1 client.

use std::time::Duration;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::export::download::AttachmentSource;
use crate::fetch::MailSource;
use crate::model::message::RawMessage;

/// Gmail API base URL for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Largest page size the list endpoint accepts.
const MAX_PAGE_SIZE: u32 = 500;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// base64url that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    #[serde(default)]
    data: String,
}

/// Gmail client bound to one access token.
pub struct GmailClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(access_token, GMAIL_API_BASE)
    }

    /// Create a client against a different API root.
    pub fn with_base_url(access_token: impl Into<String>, base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// List ids of messages matching `query`, following pagination until
    /// `max_results` ids are collected or the listing ends.
    pub fn list_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let limit = max_results as usize;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let page_size = (limit - ids.len()).min(MAX_PAGE_SIZE as usize).to_string();
            let mut params = vec![("q", query.to_string()), ("maxResults", page_size)];
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }

            let resp = self
                .http
                .get(format!("{}/messages", self.base_url))
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()?;
            let page: ListResponse = check(resp)?.json()?;

            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(limit);
        debug!(count = ids.len(), "Listed messages");
        Ok(ids)
    }

    /// Fetch one message with its full part tree.
    pub fn get_message(&self, message_id: &str) -> Result<RawMessage> {
        validate_id(message_id)?;
        let resp = self
            .http
            .get(format!("{}/messages/{message_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()?;
        Ok(check(resp)?.json()?)
    }

    /// Fetch and decode the bytes of one attachment.
    pub fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        validate_id(message_id)?;
        validate_id(attachment_id)?;
        let resp = self
            .http
            .get(format!(
                "{}/messages/{message_id}/attachments/{attachment_id}",
                self.base_url
            ))
            .bearer_auth(&self.access_token)
            .send()?;
        let body: AttachmentResponse = check(resp)?.json()?;
        decode_base64url(&body.data)
    }
}

impl AttachmentSource for GmailClient {
    fn fetch_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        self.get_attachment(message_id, attachment_id)
    }
}

impl MailSource for GmailClient {
    /// Messages that fail to load are logged and left out.
    fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawMessage>> {
        let ids = self.list_message_ids(query, max_results)?;
        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get_message(id) {
                Ok(message) => messages.push(message),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => warn!(message_id = %id, error = %e, "Failed to fetch message"),
            }
        }
        Ok(messages)
    }
}

/// Map non-2xx responses to errors: 401/403 are authentication failures.
fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    let message = api_error_message(&body).unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(FetchError::Auth(format!("{status}: {message}")))
        }
        _ => Err(FetchError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Pull `error.message` out of a Google API error body.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Identifiers are opaque path segments.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\', '?', '#']) || id.contains("..") {
        return Err(FetchError::Api {
            status: 400,
            message: format!("invalid identifier: {id:?}"),
        });
    }
    Ok(())
}

/// Decode base64url attachment data, padded or not.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| FetchError::Decode(format!("attachment data is not base64url: {e}")))
}
