//! # Store Traits
//!
//! The record-store seams the submission pipeline and the reference cache
//! are written against. The SQLite repositories in [`crate::repository`]
//! implement them; hosts with their own persistence can implement them too.
//!
//! ```text
//! ┌───────────────────────┐        ┌────────────────────────────┐
//! │  IrisService          │───────►│  dyn InvoiceStore          │
//! │  BackgroundSubmitter  │        │  find_by_id / update_fields│
//! └───────────────────────┘        │  query / insert            │
//!                                  └────────────────────────────┘
//! ┌───────────────────────┐        ┌────────────────────────────┐
//! │  ReferenceCache       │───────►│  dyn OptionStore           │
//! └───────────────────────┘        │  codes_for / latest_update │
//!                                  │  insert_batch / search     │
//!                                  └────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use iris_core::{Channel, InvoiceRecord, OptionType, RecordPatch, ReferenceOption, SubmissionStatus};

use crate::error::DbResult;

/// Filter for [`InvoiceStore::query`]. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub channel: Option<Channel>,
    pub status: Option<SubmissionStatus>,
    pub limit: Option<u32>,
}

impl InvoiceFilter {
    /// Records of one channel in one status.
    pub fn by_status(channel: Channel, status: SubmissionStatus) -> Self {
        InvoiceFilter {
            channel: Some(channel),
            status: Some(status),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Invoices and POS orders, keyed by channel + id.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Loads a record with its lines.
    async fn find_by_id(&self, channel: Channel, id: &str) -> DbResult<Option<InvoiceRecord>>;

    /// Writes the submission fields in `patch`, in their own transaction.
    ///
    /// Fails with `NotFound` if the record does not exist.
    async fn update_fields(&self, channel: Channel, id: &str, patch: &RecordPatch) -> DbResult<()>;

    /// Records matching `filter`, oldest first.
    async fn query(&self, filter: &InvoiceFilter) -> DbResult<Vec<InvoiceRecord>>;

    /// Inserts a record with its lines.
    async fn insert(&self, record: &InvoiceRecord) -> DbResult<()>;
}

/// Cached FBR reference options. Entries are only ever inserted.
#[async_trait]
pub trait OptionStore: Send + Sync {
    /// Codes already cached for a type.
    async fn codes_for(&self, option_type: OptionType) -> DbResult<HashSet<String>>;

    /// Most recent `last_updated` for a type, `None` when the type is empty.
    async fn latest_update(&self, option_type: OptionType) -> DbResult<Option<DateTime<Utc>>>;

    /// Inserts a batch in one transaction. Codes that already exist for their
    /// type are skipped, never overwritten. Returns the number inserted.
    async fn insert_batch(&self, options: &[ReferenceOption]) -> DbResult<u64>;

    /// Case-insensitive match on code or name within a type.
    async fn search(&self, option_type: OptionType, query: &str, limit: u32) -> DbResult<Vec<ReferenceOption>>;

    /// Every cached entry of a type, ordered by code.
    async fn list(&self, option_type: OptionType) -> DbResult<Vec<ReferenceOption>>;
}
