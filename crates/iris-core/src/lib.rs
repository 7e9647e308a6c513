//! # iris-core: Pure Tax Logic for the FBR IRIS Connector
//!
//! This crate turns a completed sale into the exact JSON the FBR IRIS
//! digital-invoicing API expects. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     FBR IRIS Connector Architecture                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    iris-cli / host platform                     │   │
//! │  │    submit, submit-bg, retry-failed, refresh-options, ...        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                iris-client (HTTP + orchestration)               │   │
//! │  │   SubmissionClient, ReferenceCache, IrisService                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ iris-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │    tax    │  │  totals   │  │  payload  │  │ scenario  │  │   │
//! │  │   │ resolver  │  │ per line  │  │  FBR JSON │  │ SN001/002 │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    iris-db (Record Store)                       │   │
//! │  │          invoices, lines, cached reference options              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (InvoiceRecord, InvoiceLine, TaxComponent, ...)
//! - [`money`] - Decimal rounding and percentages
//! - [`tax`] - Tax Component Resolver
//! - [`totals`] - Line and invoice totals, host reconciliation
//! - [`payload`] - FBR request body
//! - [`scenario`] - Scenario code selection
//! - [`policy`] - Per-channel behavior
//! - [`fee`] - POS service-fee line
//! - [`validation`] - Pre-submission checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use iris_core::{build_payload, Channel, ChannelPolicy, CompanyFbrConfig};
//! use iris_core::{InvoiceLine, InvoiceRecord, TaxComponent, TaxKind};
//! use rust_decimal::Decimal;
//!
//! let mut record = InvoiceRecord::new(Channel::Invoice, "1", "INV/2026/0001");
//! record.date = NaiveDate::from_ymd_opt(2026, 1, 5);
//! record.lines.push(
//!     InvoiceLine::new(1, "P1", Decimal::from(100), Decimal::from(2))
//!         .with_tax(TaxComponent::percent(TaxKind::SalesTax, Decimal::from(18))),
//! );
//!
//! let mut policy = ChannelPolicy::invoice();
//! policy.inject_further_tax = false;
//!
//! let payload = build_payload(&record, &CompanyFbrConfig::default(), &policy).unwrap();
//! assert_eq!(payload.items[0].total_values, Decimal::from(236));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fee;
pub mod money;
pub mod payload;
pub mod policy;
pub mod scenario;
pub mod tax;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use fee::ensure_service_fee_line;
pub use money::{round_money, Percent};
pub use payload::{build_payload, InvoicePayload, ItemPayload};
pub use policy::{ChannelPolicy, SERVICE_FEE_PRODUCT_CODE};
pub use scenario::resolve_scenario;
pub use tax::{inject_further_tax, resolve_taxes, ResolvedTax, ResolvedTaxes};
pub use totals::{calculate_totals, compute_line, reconcile, InvoiceTotals, LineCalculation, Reconciliation};
pub use types::*;
pub use validation::validate_for_submission;
