//! Gmail REST client.

use super::{AuthError, MailClient, MailClientProvider, MailError, MessagePage, RawMessage};
use crate::config::GmailConfig;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(config: &GmailConfig, access_token: impl Into<String>) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("order-checker/0.1")
            .build()
            .map_err(MailError::Http)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn messages_url(&self, user: &str) -> String {
        format!("{}/users/{}/messages", self.base_url, user)
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_messages(
        &self,
        user: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailError> {
        let mut params = vec![("q", query)];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response = self
            .http
            .get(self.messages_url(user))
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;

        let response = check_status(response, None).await?;
        let body: ListResponse = response.json().await?;

        Ok(MessagePage {
            ids: body.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_message(&self, user: &str, id: &str) -> Result<RawMessage, MailError> {
        let response = self
            .http
            .get(format!("{}/{}", self.messages_url(user), id))
            .bearer_auth(&self.access_token)
            .query(&[("format", "raw")])
            .send()
            .await?;

        let response = check_status(response, Some(id)).await?;
        let body: RawResponse = response.json().await?;
        let raw = decode_base64(&body.raw)?;

        Ok(RawMessage { id: body.id, raw })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    id: String,
    #[serde(default)]
    raw: String,
}

async fn check_status(
    response: reqwest::Response,
    message_id: Option<&str>,
) -> Result<reqwest::Response, MailError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, body, message_id))
}

/// Map a failed upstream response onto the retryable/non-retryable split.
fn classify_failure(status: StatusCode, body: String, message_id: Option<&str>) -> MailError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("rateLimitExceeded")
        || body.contains("userRateLimitExceeded")
    {
        return MailError::RateLimited(body);
    }
    if status.is_server_error() || body.contains("backendError") {
        return MailError::Backend(body);
    }
    match (status, message_id) {
        (StatusCode::NOT_FOUND, Some(id)) => MailError::NotFound(id.to_string()),
        (StatusCode::UNAUTHORIZED, _) => MailError::Unauthorized(body),
        _ => MailError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// Decode an upstream base64 payload.
///
/// Payloads are normally URL-safe without padding, but standard and padded
/// variants show up as well.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, MailError> {
    let trimmed: String = data
        .trim()
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();

    if let Ok(bytes) = URL_SAFE_NO_PAD.decode(&trimmed) {
        return Ok(bytes);
    }
    if let Ok(bytes) = STANDARD_NO_PAD.decode(&trimmed) {
        return Ok(bytes);
    }

    let mut padded = trimmed;
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.push_str(&"=".repeat(4 - rem));
    }
    if let Ok(bytes) = URL_SAFE.decode(&padded) {
        return Ok(bytes);
    }
    STANDARD
        .decode(&padded)
        .map_err(|e| MailError::Decode(e.to_string()))
}

/// Provider that hands every user the same bearer token.
pub struct StaticTokenProvider {
    config: GmailConfig,
}

impl StaticTokenProvider {
    pub fn new(config: GmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailClientProvider for StaticTokenProvider {
    async fn mail_client(&self, user: &str) -> Result<Arc<dyn MailClient>, AuthError> {
        let token = self
            .config
            .access_token
            .clone()
            .ok_or_else(|| AuthError::MissingCredentials(user.to_string()))?;
        let client =
            GmailClient::new(&self.config, token).map_err(|e| AuthError::Client(e.to_string()))?;
        Ok(Arc::new(client))
    }
}
