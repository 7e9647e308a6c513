//! # iris-client: FBR IRIS Integration
//!
//! Submits invoices and POS orders to the FBR IRIS digital-invoicing
//! gateway, keeps the FBR reference tables cached locally and answers buyer
//! registration lookups.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        iris-client Components                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                         IrisService                             │   │
//! │  │  submit • send • submit_in_background • handle_order_paid       │   │
//! │  │  retry_failed • check_buyer_registration • refresh_reference    │   │
//! │  └───────┬───────────────────┬───────────────────────┬─────────────┘   │
//! │          │                   │                       │                  │
//! │  ┌───────▼────────┐  ┌───────▼─────────────┐  ┌──────▼─────────────┐   │
//! │  │   Pipeline     │◄─│ BackgroundSubmitter │  │  ReferenceCache    │   │
//! │  │ load → payload │  │ mpsc jobs, JoinSet  │  │ base + dependent   │   │
//! │  │ → submit →     │  └─────────────────────┘  │ lookups, bounded   │   │
//! │  │ persist        │                           │ worker pools       │   │
//! │  └───────┬────────┘                           └──────┬─────────────┘   │
//! │          │                                           │                  │
//! │  ┌───────▼──────────────┐                            │                  │
//! │  │  SubmissionClient    │   ┌────────────────────┐   │                  │
//! │  │  3 attempts, 429     │   │ RegistrationClient │   │                  │
//! │  │  Retry-After, backoff│   └─────────┬──────────┘   │                  │
//! │  └───────┬──────────────┘             │              │                  │
//! │          └────────────────────┬───────┴──────────────┘                  │
//! │                      ┌────────▼──────────┐                              │
//! │                      │  dyn IrisTransport │  ReqwestTransport in prod   │
//! │                      └───────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use iris_client::{IrisConfig, IrisService, ReqwestTransport};
//! use iris_core::Channel;
//! use iris_db::{Database, DbConfig};
//!
//! let config = IrisConfig::load_or_default(None);
//! let path = config.database_path().unwrap_or_else(|| "iris.db".into());
//! let db = Database::new(DbConfig::new(path)).await?;
//! let mut service = IrisService::new(
//!     config,
//!     Arc::new(db.invoices()),
//!     Arc::new(db.options()),
//!     Arc::new(ReqwestTransport::new()),
//! );
//! service.start_background();
//!
//! let submitted = service.submit(Channel::Invoice, "42").await?;
//! println!("FBR invoice number: {}", submitted.invoice_number);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod background;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod reference;
pub mod registration;
pub mod service;
pub mod submission;

// =============================================================================
// Re-exports
// =============================================================================

pub use background::{BackgroundHandle, BackgroundSubmitter};
pub use config::IrisConfig;
pub use error::{IrisError, IrisResult, TransportError};
pub use http::{HttpReply, IrisTransport, ReqwestTransport};
pub use pipeline::{Pipeline, Submitted};
pub use reference::{RefreshReport, ReferenceCache};
pub use registration::RegistrationClient;
pub use service::{IrisService, OrderPaidOutcome, RetryResult, SubmitResponse};
pub use submission::{FailureKind, SubmissionClient, SubmissionOutcome};
