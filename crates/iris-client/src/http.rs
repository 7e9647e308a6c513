//! # HTTP Transport
//!
//! The single seam between the connector and the network. The submission
//! client, reference cache and registration check are written against
//! [`IrisTransport`]; production uses [`ReqwestTransport`].
//!
//! ```text
//! ┌──────────────────┐   post_json / get_json   ┌──────────────────────┐
//! │ SubmissionClient │─────────────────────────►│  dyn IrisTransport   │
//! │ ReferenceCache   │                          │  ├─ ReqwestTransport │
//! │ RegistrationCli  │◄─────────────────────────│  └─ test fakes       │
//! └──────────────────┘        HttpReply         └──────────────────────┘
//! ```
//!
//! Non-2xx statuses are NOT errors at this layer: they come back as an
//! [`HttpReply`] so callers can read the body and decide. Only failures to
//! get a response at all are a [`TransportError`].

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;

/// Status, `Retry-After` and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// `Retry-After` in seconds, when the server sent an integer value.
    pub retry_after: Option<u64>,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpReply {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    /// The authority only ever answers 200 on success.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Body parsed as JSON, `None` if it isn't.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Bearer-authenticated JSON calls against the authority.
#[async_trait]
pub trait IrisTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        token: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError>;

    async fn get_json(&self, url: &str, token: &str, timeout: Duration) -> Result<HttpReply, TransportError>;
}

/// Normalizes a configured token into an `Authorization` value.
///
/// Tokens are often pasted with the scheme already present.
pub fn authorization_header(token: &str) -> String {
    let token = token.trim();
    match token.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => {
            format!("Bearer {}", token[7..].trim_start())
        }
        _ => format!("Bearer {}", token),
    }
}

/// Parses an integer-seconds `Retry-After`. HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

// =============================================================================
// reqwest implementation
// =============================================================================

/// [`IrisTransport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport {
            client: reqwest::Client::new(),
        }
    }

    /// Uses an existing client (shared connection pool, custom TLS...).
    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }

    async fn send(&self, request: reqwest::RequestBuilder, timeout: Duration) -> Result<HttpReply, TransportError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(|e| map_reqwest_error(e, timeout))?;

        debug!(status, bytes = body.len(), "HTTP response received");

        Ok(HttpReply {
            status,
            retry_after,
            body,
        })
    }
}

#[async_trait]
impl IrisTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        token: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        let request = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization_header(token))
            .json(body);
        self.send(request, timeout).await
    }

    async fn get_json(&self, url: &str, token: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        let request = self.client.get(url).header(AUTHORIZATION, authorization_header(token));
        self.send(request, timeout).await
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout.as_secs())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}
