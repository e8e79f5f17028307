//! Upstream mailbox access.
//!
//! The scan core only talks to a mailbox through [`MailClient`]. Obtaining an
//! authenticated client for a user is delegated to a [`MailClientProvider`];
//! the OAuth flow behind it lives outside this crate.
//!
//! - **`gmail`**: REST implementation against the Gmail API.
//! - **`parser`**: RFC 822 / MIME decoding of fetched messages.
//! - **`query`**: search-query construction for a scan window.

pub mod gmail;
pub mod parser;
pub mod query;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use gmail::{GmailClient, StaticTokenProvider};
pub use parser::{ParsedMessage, parse_message};
pub use query::ScanWindow;

/// One page of message IDs returned by a listing call.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// A fetched message in its raw RFC 822 form.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub raw: Vec<u8>,
}

/// Errors reported by a mail backend.
///
/// Rate limits and backend failures are transient and worth retrying; every
/// other variant means the request will not succeed by repeating it.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("mail HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mail service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("message {0} not found")]
    NotFound(String),
    #[error("failed to decode message payload: {0}")]
    Decode(String),
    #[error("authorization rejected: {0}")]
    Unauthorized(String),
}

impl MailError {
    pub fn is_transient(&self) -> bool {
        match self {
            MailError::RateLimited(_) | MailError::Backend(_) => true,
            MailError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// Errors raised while obtaining a mail client for a user.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials configured for {0}")]
    MissingCredentials(String),
    #[error("failed to build mail client: {0}")]
    Client(String),
}

/// Read access to one mailbox.
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Fetch one page of message IDs matching `query`.
    async fn list_messages(
        &self,
        user: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailError>;

    /// Fetch a full message by ID.
    async fn get_message(&self, user: &str, id: &str) -> Result<RawMessage, MailError>;
}

/// Hands out authenticated mail clients.
#[async_trait]
pub trait MailClientProvider: Send + Sync {
    async fn mail_client(&self, user: &str) -> Result<Arc<dyn MailClient>, AuthError>;
}
