//! # iris-db: Record Store for the FBR IRIS Connector
//!
//! SQLite persistence for invoices, POS orders and the cached FBR reference
//! tables, plus the store traits the pipeline is written against.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Connector Data Flow                              │
//! │                                                                         │
//! │  IrisService / ReferenceCache (iris-client)                            │
//! │       │  dyn InvoiceStore, dyn OptionStore                             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     iris-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │  Repositories      │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │ InvoiceRepository  │  │ (embedded) │  │   │
//! │  │   │ SqlitePool    │◄───│ OptionRepository   │  │ 001_*.sql  │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (iris.db in the platform data dir)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use iris_db::{Database, DbConfig, InvoiceStore};
//!
//! let db = Database::new(DbConfig::new("iris.db")).await?;
//! let record = db.invoices().find_by_id(Channel::PosOrder, "42").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::invoice::InvoiceRepository;
pub use repository::option::OptionRepository;
pub use store::{InvoiceFilter, InvoiceStore, OptionStore};
