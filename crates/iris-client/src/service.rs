//! # IrisService
//!
//! The facade a host platform calls. Wires config, record store, transport,
//! submission pipeline, background submitter and reference cache together.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          IrisService                                    │
//! │                                                                         │
//! │  submit(channel, id)            ──► Pipeline ──► Submitted | IrisError  │
//! │  send(channel, id)              ──► SubmitResponse (host JSON shape)    │
//! │  submit_in_background(ch, id)   ──► BackgroundHandle::enqueue           │
//! │  handle_order_paid(id)          ──► try now, else mark Failed + queue   │
//! │  retry_failed(channel)          ──► resubmit every Failed record        │
//! │  check_buyer_registration(..)   ──► RegistrationClient + store patch    │
//! │  refresh_reference(force)       ──► ReferenceCache::refresh             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use iris_core::{Channel, OptionType, RecordPatch, ReferenceOption, RegistrationType, SubmissionStatus, ValidationError};
use iris_db::{InvoiceFilter, InvoiceStore, OptionStore};

use crate::background::{BackgroundHandle, BackgroundSubmitter};
use crate::config::IrisConfig;
use crate::error::{IrisError, IrisResult};
use crate::http::IrisTransport;
use crate::pipeline::{Pipeline, Submitted};
use crate::reference::{RefreshReport, ReferenceCache};
use crate::registration::RegistrationClient;

/// Response handed back to the host for a submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    Posted {
        invoice_number: String,
        status: SubmissionStatus,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<SubmissionStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

/// What happened when a paid POS order was pushed to FBR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderPaidOutcome {
    Posted(Submitted),
    /// Failed now, marked Failed, queued for a background attempt.
    Deferred { error: String },
    /// Failed now, marked Failed, not worth retrying without operator action.
    Failed { error: String },
    /// E-invoicing is off for POS.
    Skipped,
}

/// Result of resubmitting one record in `retry_failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryResult {
    pub id: String,
    pub result: Result<String, String>,
}

/// Entry point for host integrations.
pub struct IrisService {
    pipeline: Pipeline,
    reference: ReferenceCache,
    registration: RegistrationClient,
    background: Option<BackgroundHandle>,
}

impl IrisService {
    pub fn new(
        config: IrisConfig,
        invoices: Arc<dyn InvoiceStore>,
        options: Arc<dyn OptionStore>,
        transport: Arc<dyn IrisTransport>,
    ) -> Self {
        let config = Arc::new(config);
        let reference = ReferenceCache::from_config(transport.clone(), options, &config);
        let registration = RegistrationClient::from_config(transport.clone(), &config);
        let pipeline = Pipeline::new(config, invoices, transport);

        IrisService {
            pipeline,
            reference,
            registration,
            background: None,
        }
    }

    /// Spawns the background submitter on the current runtime.
    pub fn start_background(&mut self) -> BackgroundHandle {
        let handle = BackgroundSubmitter::spawn(self.pipeline.clone());
        self.background = Some(handle.clone());
        handle
    }

    pub fn config(&self) -> &IrisConfig {
        self.pipeline.config()
    }

    pub fn reference(&self) -> &ReferenceCache {
        &self.reference
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submits a record now and waits for the outcome.
    pub async fn submit(&self, channel: Channel, id: &str) -> IrisResult<Submitted> {
        self.pipeline.submit(channel, id).await
    }

    /// Submits a record and answers in the host's response shape. Never fails.
    pub async fn send(&self, channel: Channel, id: &str) -> SubmitResponse {
        match self.pipeline.submit(channel, id).await {
            Ok(submitted) => SubmitResponse::Posted {
                invoice_number: submitted.invoice_number,
                status: submitted.status,
            },
            Err(IrisError::NotFound { .. }) => SubmitResponse::Error {
                error: format!("{} not found", channel_label(channel)),
                status: None,
                error_message: None,
            },
            Err(e) => {
                let record = self.pipeline.invoices().find_by_id(channel, id).await.ok().flatten();
                SubmitResponse::Error {
                    error: e.to_string(),
                    status: record.as_ref().map(|r| r.submission_status),
                    error_message: record.and_then(|r| r.last_error_message),
                }
            }
        }
    }

    /// Queues a record for the background submitter.
    pub async fn submit_in_background(&self, channel: Channel, id: &str) -> IrisResult<()> {
        self.pipeline.config().company.ensure_ready()?;
        match &self.background {
            Some(handle) => handle.enqueue(channel, id).await,
            None => Err(IrisError::ChannelError("Background submitter is not running".into())),
        }
    }

    /// Order-paid hook: one synchronous try, then hand off on failure.
    ///
    /// The sale itself never fails because of FBR.
    pub async fn handle_order_paid(&self, id: &str) -> IrisResult<OrderPaidOutcome> {
        let channel = Channel::PosOrder;
        if !self.config().pos.e_invoicing {
            return Ok(OrderPaidOutcome::Skipped);
        }

        let err = match self.pipeline.submit(channel, id).await {
            Ok(submitted) => return Ok(OrderPaidOutcome::Posted(submitted)),
            Err(e @ IrisError::NotFound { .. }) => return Err(e),
            Err(e) => e,
        };

        let error = err.to_string();
        warn!(id, error = %error, "FBR posting failed at payment");
        if !matches!(err, IrisError::TerminalSubmission { .. }) {
            self.pipeline.mark_failed(channel, id, &error).await?;
        }

        match (&self.background, err.is_retryable()) {
            (Some(handle), true) => {
                handle.enqueue(channel, id).await?;
                Ok(OrderPaidOutcome::Deferred { error })
            }
            _ => Ok(OrderPaidOutcome::Failed { error }),
        }
    }

    /// Resubmits every Failed record of a channel, oldest first.
    pub async fn retry_failed(&self, channel: Channel) -> IrisResult<Vec<RetryResult>> {
        self.config().company.ensure_ready()?;

        let failed = self
            .pipeline
            .invoices()
            .query(&InvoiceFilter::by_status(channel, SubmissionStatus::Failed))
            .await?;
        info!(%channel, count = failed.len(), "Retrying failed submissions");

        let mut results = Vec::with_capacity(failed.len());
        for record in failed {
            let result = self
                .pipeline
                .submit(channel, &record.id)
                .await
                .map(|s| s.invoice_number)
                .map_err(|e| e.to_string());
            results.push(RetryResult { id: record.id, result });
        }
        Ok(results)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Looks up the buyer's registration type and stores it on the record.
    pub async fn check_buyer_registration(&self, channel: Channel, id: &str) -> IrisResult<Option<RegistrationType>> {
        let record = self
            .pipeline
            .invoices()
            .find_by_id(channel, id)
            .await?
            .ok_or_else(|| IrisError::NotFound {
                channel: channel.to_string(),
                id: id.to_string(),
            })?;

        let tax_id = record.buyer.tax_id().ok_or_else(|| ValidationError::Required {
            field: "buyerNTNCNIC".to_string(),
        })?;

        let kind = self.registration.check(tax_id).await?;
        if let Some(kind) = kind {
            let patch = RecordPatch {
                buyer_registration_type: Some(kind),
                ..RecordPatch::default()
            };
            self.pipeline.invoices().update_fields(channel, id, &patch).await?;
        }
        Ok(kind)
    }

    /// Refreshes the reference cache. Needs a bearer token.
    pub async fn refresh_reference(&self, force: bool) -> IrisResult<RefreshReport> {
        if self.config().company.bearer_token.trim().is_empty() {
            return Err(IrisError::Configuration("FBR bearer token is not configured".into()));
        }
        Ok(self.reference.refresh(force).await)
    }

    pub async fn search_options(&self, option_type: OptionType, query: &str, limit: u32) -> IrisResult<Vec<ReferenceOption>> {
        self.reference.search(option_type, query, limit).await
    }

    /// Stops the background submitter, waiting for queued work.
    pub async fn shutdown(&self) -> IrisResult<()> {
        if let Some(handle) = &self.background {
            handle.shutdown().await?;
        }
        Ok(())
    }
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Invoice => "Invoice",
        Channel::PosOrder => "Order",
    }
}
