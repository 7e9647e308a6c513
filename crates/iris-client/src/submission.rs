//! # Submission Client
//!
//! Posts one invoice payload to FBR IRIS with bounded retries.
//!
//! ## Attempt Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Submission State Machine                            │
//! │                                                                         │
//! │   attempt = 1 ..= max_retries + 1                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   POST payload (timeout 10s)                                            │
//! │        │                                                                │
//! │        ├── 200 + validationResponse.statusCode "00" ──► Posted          │
//! │        │                                                                │
//! │        ├── 429 ──► sleep Retry-After (or backoff) ──► next attempt      │
//! │        │           last attempt ──► Failed("rate limited")              │
//! │        │                                                                │
//! │        ├── other ──► attempts left? sleep backoff ──► next attempt      │
//! │        │             else ──► Failed(authority message)                 │
//! │        │                                                                │
//! │        └── transport error ──► attempts left? sleep backoff ──► next    │
//! │                                else ──► Failed(request error)           │
//! │                                                                         │
//! │   Backoff: base * 2^(attempt-1)  →  1s, 2s, 4s with the defaults        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The client never touches the record store. Persisting the outcome is
//! the caller's job (see `IrisService`).

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use iris_core::InvoicePayload;

use crate::config::IrisConfig;
use crate::error::IrisResult;
use crate::http::{HttpReply, IrisTransport};

/// Authority status code for an accepted invoice.
const STATUS_ACCEPTED: &str = "00";

/// Why a submission ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The authority answered, but not with an acceptance.
    Rejected,
    /// Still rate limited on the last attempt.
    RateLimited,
    /// No response on the last attempt.
    Transport,
}

/// Terminal state of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Posted {
        invoice_number: String,
        raw_response: String,
        attempts: u32,
    },
    Failed {
        kind: FailureKind,
        /// Text persisted on the record.
        message: String,
        raw_response: String,
        attempts: u32,
    },
}

impl SubmissionOutcome {
    pub fn is_posted(&self) -> bool {
        matches!(self, SubmissionOutcome::Posted { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            SubmissionOutcome::Posted { attempts, .. } | SubmissionOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    /// Text raised to the caller for a failed submission.
    pub fn terminal_message(&self) -> Option<String> {
        match self {
            SubmissionOutcome::Posted { .. } => None,
            SubmissionOutcome::Failed {
                kind: FailureKind::Transport,
                message,
                ..
            } => Some(message.clone()),
            SubmissionOutcome::Failed { message, attempts, .. } => {
                Some(format!("FBR posting failed after {} attempts: {}", attempts, message))
            }
        }
    }
}

/// Submits payloads to the configured IRIS endpoint.
#[derive(Clone)]
pub struct SubmissionClient {
    transport: Arc<dyn IrisTransport>,
    url: String,
    token: String,
    max_retries: u32,
    backoff_base: Duration,
    timeout: Duration,
}

impl SubmissionClient {
    /// Client with the default budget: 2 retries, 1s base backoff, 10s timeout.
    pub fn new(transport: Arc<dyn IrisTransport>, url: impl Into<String>, token: impl Into<String>) -> Self {
        SubmissionClient {
            transport,
            url: url.into(),
            token: token.into(),
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }

    /// Client for the company endpoint and retry budget in `config`.
    pub fn from_config(transport: Arc<dyn IrisTransport>, config: &IrisConfig) -> Self {
        SubmissionClient::new(transport, &config.company.api_base_url, &config.company.bearer_token)
            .max_retries(config.submission.max_retries)
            .backoff_base(config.backoff_base())
            .timeout(config.submission_timeout())
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the attempt loop for one payload.
    ///
    /// Only payload serialization can fail here; every authority or
    /// transport failure ends as `SubmissionOutcome::Failed`.
    pub async fn submit(&self, ref_no: &str, payload: &InvoicePayload) -> IrisResult<SubmissionOutcome> {
        let body = payload.to_json()?;
        let total = self.max_retries + 1;
        let mut backoff = self.create_backoff();

        info!(ref_no, url = %self.url, max_attempts = total, "Submitting to FBR");

        for attempt in 1..=total {
            let is_last = attempt == total;
            // Advanced every attempt so the delay tracks the attempt number.
            let delay = backoff.next_backoff().unwrap_or(self.backoff_base);

            debug!(ref_no, attempt, "FBR post attempt");

            match self.transport.post_json(&self.url, &self.token, &body, self.timeout).await {
                Ok(reply) => {
                    debug!(ref_no, attempt, status = reply.status, body = %reply.body, "FBR raw response");

                    if let Some(invoice_number) = accepted_invoice_number(&reply) {
                        info!(ref_no, attempt, invoice_number = %invoice_number, "FBR accepted invoice");
                        return Ok(SubmissionOutcome::Posted {
                            invoice_number,
                            raw_response: stored_response(&reply),
                            attempts: attempt,
                        });
                    }

                    if reply.is_rate_limited() {
                        if is_last {
                            warn!(ref_no, attempt, "Rate limited on final attempt");
                            return Ok(SubmissionOutcome::Failed {
                                kind: FailureKind::RateLimited,
                                message: "rate limited".to_string(),
                                raw_response: stored_response(&reply),
                                attempts: attempt,
                            });
                        }
                        let wait = reply.retry_after.map(Duration::from_secs).unwrap_or(delay);
                        warn!(ref_no, attempt, wait_secs = wait.as_secs(), "Rate limit hit, retrying");
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    let message = error_message(&reply);
                    if is_last {
                        warn!(ref_no, attempt, error = %message, "FBR rejected invoice");
                        return Ok(SubmissionOutcome::Failed {
                            kind: FailureKind::Rejected,
                            message,
                            raw_response: stored_response(&reply),
                            attempts: attempt,
                        });
                    }
                    warn!(ref_no, attempt, error = %message, delay_ms = delay.as_millis() as u64, "FBR post attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let message = format!("Request error (Attempt {}/{}): {}", attempt, total, e);
                    if is_last {
                        warn!(ref_no, attempt, error = %message, "FBR unreachable");
                        return Ok(SubmissionOutcome::Failed {
                            kind: FailureKind::Transport,
                            message,
                            raw_response: String::new(),
                            attempts: attempt,
                        });
                    }
                    warn!(ref_no, error = %message, delay_ms = delay.as_millis() as u64, "Retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // total >= 1, so the loop always returns
        Ok(SubmissionOutcome::Failed {
            kind: FailureKind::Transport,
            message: "no attempts made".to_string(),
            raw_response: String::new(),
            attempts: 0,
        })
    }

    /// Exponential backoff without jitter: base, 2*base, 4*base, ...
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.backoff_base)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(3600))
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Invoice number when the reply is an acceptance.
fn accepted_invoice_number(reply: &HttpReply) -> Option<String> {
    if !reply.is_ok() {
        return None;
    }
    let json = reply.json()?;
    if json.pointer("/validationResponse/statusCode").and_then(Value::as_str) != Some(STATUS_ACCEPTED) {
        return None;
    }
    Some(
        json.get("invoiceNumber")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

/// Human-readable error: top-level `Message`, else the nested validation message.
fn error_message(reply: &HttpReply) -> String {
    let json = match reply.json() {
        Some(json) => json,
        None if reply.body.trim().is_empty() => return "No response data".to_string(),
        None => return format!("HTTP {}", reply.status),
    };

    let message = [json.get("Message"), json.pointer("/validationResponse/message")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("Unknown Error")
        .to_string();
    message
}

/// Response as persisted on the record: pretty JSON when it parses.
fn stored_response(reply: &HttpReply) -> String {
    if reply.body.trim().is_empty() {
        return serde_json::json!({ "Message": "No response data" }).to_string();
    }
    reply
        .json()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| reply.body.clone())
}
