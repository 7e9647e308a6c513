//! # Error Types
//!
//! Domain-specific error types for iris-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  iris-core errors (this file)                                          │
//! │  ├── CoreError        - Configuration and domain rule failures         │
//! │  └── ValidationError  - Record is not fit for submission               │
//! │                                                                         │
//! │  iris-db errors (separate crate)                                       │
//! │  └── DbError          - Record store failures                          │
//! │                                                                         │
//! │  iris-client errors (separate crate)                                   │
//! │  └── IrisError        - What the host platform sees                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → IrisError → host                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calculation-stage errors abort a submission before any network I/O.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Integration is switched off or incomplete.
    ///
    /// ## When This Occurs
    /// - `integration_enabled` is false for the seller
    /// - Submission URL or bearer token is blank
    #[error("FBR configuration error: {0}")]
    Configuration(String),

    /// A POS service fee is configured but no fee product is set up.
    #[error("POS service fee product is not configured")]
    ServiceFeeProductMissing,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Reasons a record cannot be turned into an FBR payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The invoice/order has no lines to report.
    #[error("no lines")]
    NoLines,

    /// The invoice/order has no date.
    #[error("missing date")]
    MissingDate,

    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A numeric value cannot be used (negative quantity, discount > 100, ...).
    #[error("{field} is invalid: {reason}")]
    Invalid { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
