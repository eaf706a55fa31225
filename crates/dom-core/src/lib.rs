//! Domiciliation management core.
//!
//! The data-integrity layer of a registered-office (domiciliation)
//! business: clients in two kinds, their contracts and invoices,
//! payments, a per-field change history and read-side statistics,
//! all on a SQLite store.
//!
//! Presentation layers (UI, reports, exports) are callers of the
//! repository API in this crate, never owners of the rules.

pub mod audit;
pub mod client;
pub mod contract;
pub mod error;
pub mod invoice;
pub mod numbering;
pub mod payment;
pub mod stats;
pub mod store;
pub mod validation;

pub use error::{CoreError, Result};
