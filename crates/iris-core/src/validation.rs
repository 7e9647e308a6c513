//! # Validation Module
//!
//! Checks that run before any figure is computed or any request is sent.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IrisService::submit(channel, id)                                       │
//! │       │                                                                 │
//! │       ├── CompanyFbrConfig::ensure_ready()   → ConfigurationError       │
//! │       │                                                                 │
//! │       ├── validate_for_submission()  ← THIS MODULE                      │
//! │       │     ├── ref_no empty?         → "invoiceRefNo is required"      │
//! │       │     ├── no reportable lines?  → "no lines"                      │
//! │       │     ├── no date?              → "missing date"                  │
//! │       │     └── bad quantity/discount → "... is invalid: ..."           │
//! │       │                                                                 │
//! │       └── build_payload() → SubmissionClient::submit()                  │
//! │                                                                         │
//! │  A failure here aborts before any network I/O.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::policy::ChannelPolicy;
use crate::types::{InvoiceLine, InvoiceRecord};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a record against the local pre-submission rules.
///
/// Service-fee lines are ignored when counting lines, so a POS order
/// holding only the fee line fails with `NoLines`.
pub fn validate_for_submission(record: &InvoiceRecord, policy: &ChannelPolicy) -> ValidationResult<()> {
    if record.ref_no.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "invoiceRefNo".to_string(),
        });
    }

    let mut reported = record
        .lines
        .iter()
        .filter(|line| !policy.is_service_fee_line(line))
        .peekable();
    if reported.peek().is_none() {
        return Err(ValidationError::NoLines);
    }

    if record.date.is_none() {
        return Err(ValidationError::MissingDate);
    }

    for line in reported {
        validate_line(line)?;
    }

    Ok(())
}

/// Validates the numeric fields of one line.
///
/// ## Rules
/// - Quantity must not be negative
/// - Unit price must not be negative
/// - Discount must be within 0..=100
pub fn validate_line(line: &InvoiceLine) -> ValidationResult<()> {
    if line.quantity < Decimal::ZERO {
        return Err(ValidationError::Invalid {
            field: format!("line {} quantity", line.sequence),
            reason: "must not be negative".to_string(),
        });
    }

    if line.unit_price < Decimal::ZERO {
        return Err(ValidationError::Invalid {
            field: format!("line {} unit price", line.sequence),
            reason: "must not be negative".to_string(),
        });
    }

    if line.discount_percent < Decimal::ZERO || line.discount_percent > Decimal::ONE_HUNDRED {
        return Err(ValidationError::Invalid {
            field: format!("line {} discount", line.sequence),
            reason: "must be between 0 and 100".to_string(),
        });
    }

    Ok(())
}

/// Validates a reference-option search query.
///
/// ## Rules
/// - Can be empty (returns all entries of the type)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(ValidationError::Invalid {
            field: "query".to_string(),
            reason: "must be at most 100 characters".to_string(),
        });
    }

    Ok(query.to_string())
}
