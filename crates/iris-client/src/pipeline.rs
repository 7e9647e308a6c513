//! One record, end to end: load → build payload → submit → persist.
//!
//! Shared by the foreground `IrisService` calls and the background
//! submitter so both paths run the same state machine against the same
//! store.

use std::sync::Arc;
use tracing::{info, warn};

use iris_core::{build_payload, ensure_service_fee_line, Channel, RecordPatch, SubmissionStatus};
use iris_db::InvoiceStore;

use crate::config::IrisConfig;
use crate::error::{IrisError, IrisResult};
use crate::http::IrisTransport;
use crate::submission::{SubmissionClient, SubmissionOutcome};

/// A record that is Posted with FBR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub invoice_number: String,
    pub status: SubmissionStatus,
    /// Network attempts made by this call. 0 if the record was already posted.
    pub attempts: u32,
}

impl Submitted {
    pub fn was_already_posted(&self) -> bool {
        self.attempts == 0
    }
}

/// Submission pipeline bound to a config, a store and a transport.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<IrisConfig>,
    invoices: Arc<dyn InvoiceStore>,
    client: SubmissionClient,
}

impl Pipeline {
    pub fn new(config: Arc<IrisConfig>, invoices: Arc<dyn InvoiceStore>, transport: Arc<dyn IrisTransport>) -> Self {
        let client = SubmissionClient::from_config(transport, &config);
        Pipeline {
            config,
            invoices,
            client,
        }
    }

    pub fn config(&self) -> &IrisConfig {
        &self.config
    }

    /// Submits one record and persists the outcome.
    ///
    /// Configuration and validation failures return before any network
    /// call and leave the record untouched. A terminal submission failure
    /// is persisted as Failed, then returned as `TerminalSubmission`.
    pub async fn submit(&self, channel: Channel, id: &str) -> IrisResult<Submitted> {
        self.config.company.ensure_ready()?;

        let policy = self.config.policy(channel);
        if !policy.e_invoicing {
            return Err(IrisError::Configuration(format!("e-invoicing is disabled for {}", channel)));
        }

        let mut record = self
            .invoices
            .find_by_id(channel, id)
            .await?
            .ok_or_else(|| IrisError::NotFound {
                channel: channel.to_string(),
                id: id.to_string(),
            })?;

        if record.is_posted() {
            let invoice_number = record.authority_invoice_number.clone().unwrap_or_default();
            info!(%channel, id, invoice_number = %invoice_number, "Already posted, not resubmitting");
            return Ok(Submitted {
                invoice_number,
                status: SubmissionStatus::Posted,
                attempts: 0,
            });
        }

        ensure_service_fee_line(&mut record, &policy)?;
        let payload = build_payload(&record, &self.config.company, &policy)?;

        let outcome = self.client.submit(&record.ref_no, &payload).await?;
        let terminal = outcome.terminal_message();

        match outcome {
            SubmissionOutcome::Posted {
                invoice_number,
                raw_response,
                attempts,
            } => {
                self.invoices
                    .update_fields(channel, id, &RecordPatch::posted(invoice_number.clone(), raw_response))
                    .await?;
                Ok(Submitted {
                    invoice_number,
                    status: SubmissionStatus::Posted,
                    attempts,
                })
            }
            SubmissionOutcome::Failed {
                message,
                raw_response,
                attempts,
                ..
            } => {
                self.invoices
                    .update_fields(channel, id, &RecordPatch::failed(message.clone(), raw_response))
                    .await?;
                Err(IrisError::TerminalSubmission {
                    message: terminal.unwrap_or(message),
                    attempts,
                })
            }
        }
    }

    /// Marks a record Failed with `message` and an empty response, in its
    /// own store write.
    pub async fn mark_failed(&self, channel: Channel, id: &str, message: &str) -> IrisResult<()> {
        warn!(%channel, id, error = %message, "Marking submission failed");
        self.invoices
            .update_fields(channel, id, &RecordPatch::failed(message, ""))
            .await?;
        Ok(())
    }

    pub(crate) fn invoices(&self) -> &Arc<dyn InvoiceStore> {
        &self.invoices
    }
}
