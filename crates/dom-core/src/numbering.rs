//! Reference number generation for contracts and invoices.
//!
//! Numbers embed the issue year and month plus a random four-digit
//! suffix, e.g. `DOM-202508-4821`. Uniqueness is enforced by the
//! repositories at insert time, not here.

use chrono::{Datelike, NaiveDate};
use rand::Rng;

const CONTRACT_PREFIX: &str = "DOM";
const INVOICE_PREFIX: &str = "INV";

fn reference(prefix: &str, date: NaiveDate) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..=9999);
    format!("{}-{}{:02}-{}", prefix, date.year(), date.month(), suffix)
}

/// Generate a contract number for the given issue date.
pub fn contract_number(date: NaiveDate) -> String {
    reference(CONTRACT_PREFIX, date)
}

/// Generate an invoice number for the given issue date.
pub fn invoice_number(date: NaiveDate) -> String {
    reference(INVOICE_PREFIX, date)
}
