//! Invoices: entity, tax arithmetic and repository.

mod entity;
mod repository;

pub use entity::{
    compute_amounts, round2, Invoice, InvoiceDetails, InvoicePatch, InvoiceStatus, NewInvoice,
};
pub use repository::InvoiceRepository;
