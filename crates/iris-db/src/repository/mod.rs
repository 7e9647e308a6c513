//! # Repository Module
//!
//! SQLite implementations of the store traits.
//!
//! ## Available Repositories
//!
//! - [`invoice::InvoiceRepository`] - Invoices and POS orders ([`crate::InvoiceStore`])
//! - [`option::OptionRepository`] - Cached FBR reference data ([`crate::OptionStore`])

pub mod invoice;
pub mod option;
