//! Gmail as the mail source: OAuth2 and the REST client.

pub mod auth;
pub mod client;

use std::path::PathBuf;

use crate::error::Result;

use self::auth::{Authenticator, TokenStore};
use self::client::GmailClient;

/// Authenticate and return a client ready to search the mailbox.
///
/// May block on the interactive consent flow when no usable token is stored.
pub fn connect(credentials_file: Option<PathBuf>, token_file: PathBuf) -> Result<GmailClient> {
    let authenticator = Authenticator::new(credentials_file, TokenStore::new(token_file));
    let token = authenticator.authenticate()?;
    tracing::info!("Gmail service initialized");
    GmailClient::new(token.access_token)
}
