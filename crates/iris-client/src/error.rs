//! # Client Error Types
//!
//! What the host platform sees when a submission, lookup or config load
//! goes wrong.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       IrisError Categories                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Local         │  │     Submission          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Configuration  │  │  Validation     │  │  Transport (retried)    │ │
//! │  │  InvalidUrl     │  │  NotFound       │  │  TerminalSubmission     │ │
//! │  │  ConfigLoad     │  │  Database       │  │                         │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Reference      │  │   Internal      │                              │
//! │  │                 │  │                 │                              │
//! │  │  ReferenceFetch │  │  Serialization  │                              │
//! │  │  (logged only)  │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration and validation errors are raised before any network call.
//! `ReferenceFetch` is collected into a refresh report, never raised by
//! `ReferenceCache::refresh`.

use thiserror::Error;

use iris_core::{CoreError, ValidationError};
use iris_db::DbError;

/// Result type alias for client operations.
pub type IrisResult<T> = Result<T, IrisError>;

/// Transport-level failures. These are the transient kind the submission
/// loop retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the per-call timeout.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other request failure (TLS, body read, invalid header...).
    #[error("request failed: {0}")]
    Request(String),
}

/// Connector error type covering every failure the host can observe.
#[derive(Debug, Error)]
pub enum IrisError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Integration disabled, endpoint or token missing, bad config value.
    #[error("FBR configuration error: {0}")]
    Configuration(String),

    /// A configured URL does not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// The record cannot be turned into a payload.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No invoice/order with this id.
    #[error("{channel} {id} not found")]
    NotFound { channel: String, id: String },

    /// Record store failure.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Submission Errors
    // =========================================================================
    /// Transport failure that escaped the retry loop.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Attempts exhausted. The record has already been marked Failed.
    #[error("{message}")]
    TerminalSubmission { message: String, attempts: u32 },

    // =========================================================================
    // Reference Errors
    // =========================================================================
    /// One lookup endpoint failed.
    #[error("Reference fetch failed [{endpoint}]: {message}")]
    ReferenceFetch { endpoint: String, message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// JSON encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Background submitter channel is closed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for IrisError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => IrisError::Validation(v),
            CoreError::Configuration(msg) => IrisError::Configuration(msg),
            other @ CoreError::ServiceFeeProductMissing => IrisError::Configuration(other.to_string()),
        }
    }
}

impl From<DbError> for IrisError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => IrisError::NotFound { channel: entity, id },
            other => IrisError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for IrisError {
    fn from(err: serde_json::Error) -> Self {
        IrisError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for IrisError {
    fn from(err: url::ParseError) -> Self {
        IrisError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for IrisError {
    fn from(err: std::io::Error) -> Self {
        IrisError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for IrisError {
    fn from(err: toml::de::Error) -> Self {
        IrisError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for IrisError {
    fn from(err: toml::ser::Error) -> Self {
        IrisError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl IrisError {
    /// Returns true if a later attempt could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IrisError::Transport(_) | IrisError::TerminalSubmission { .. } | IrisError::ReferenceFetch { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            IrisError::Configuration(_)
                | IrisError::InvalidUrl(_)
                | IrisError::ConfigLoadFailed(_)
                | IrisError::ConfigSaveFailed(_)
        )
    }

    /// Short machine-readable kind, used in host responses.
    pub fn kind(&self) -> &'static str {
        match self {
            IrisError::Configuration(_)
            | IrisError::InvalidUrl(_)
            | IrisError::ConfigLoadFailed(_)
            | IrisError::ConfigSaveFailed(_) => "configuration",
            IrisError::Validation(_) => "validation",
            IrisError::NotFound { .. } => "not_found",
            IrisError::Database(_) => "database",
            IrisError::Transport(_) | IrisError::TerminalSubmission { .. } => "submission",
            IrisError::ReferenceFetch { .. } => "reference",
            IrisError::Serialization(_) | IrisError::ChannelError(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_categories() {
        let err: IrisError = CoreError::configuration("no token").into();
        assert!(err.is_config_error());

        let err: IrisError = CoreError::Validation(ValidationError::MissingDate).into();
        assert!(matches!(err, IrisError::Validation(ValidationError::MissingDate)));
        assert_eq!(err.to_string(), "Validation failed: missing date");

        let err: IrisError = CoreError::ServiceFeeProductMissing.into();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_not_found_keeps_identity() {
        let err: IrisError = DbError::not_found("pos_order", "42").into();
        match err {
            IrisError::NotFound { channel, id } => {
                assert_eq!(channel, "pos_order");
                assert_eq!(id, "42");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(IrisError::Transport(TransportError::Timeout(10)).is_retryable());
        assert!(!IrisError::Configuration("x".into()).is_retryable());
        assert!(!IrisError::Validation(ValidationError::NoLines).is_retryable());
    }

    #[test]
    fn test_terminal_message_is_verbatim() {
        let err = IrisError::TerminalSubmission {
            message: "FBR posting failed after 3 attempts: Invalid NTN".into(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "FBR posting failed after 3 attempts: Invalid NTN");
        assert_eq!(err.kind(), "submission");
    }
}
