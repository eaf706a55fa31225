//! Invoice entity types and tax arithmetic.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::client::ClientKind;
use crate::error::{CoreError, Result};
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round to two decimals, away from zero on ties.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tax and total for a pre-tax amount at a percentage rate. Both are
/// rounded independently so the stored figures always satisfy
/// `total == round2(pre_tax + tax)`.
pub fn compute_amounts(pre_tax: f64, rate: f64) -> (f64, f64) {
    let tax = round2(pre_tax * rate / 100.0);
    let total = round2(pre_tax + tax);
    (tax, total)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub contract_id: i64,
    pub client_id: i64,
    pub client_kind: ClientKind,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub pre_tax_amount: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub description: Option<String>,
    pub payment_method: String,
    pub status: InvoiceStatus,
    pub payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Read-time status projection: a pending invoice past its due
    /// date reads as overdue. The stored status is never touched.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        if self.status == InvoiceStatus::Pending && self.due_date < today {
            InvoiceStatus::Overdue
        } else {
            self.status
        }
    }
}

/// An invoice joined with its client's display name, for listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InvoiceDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub invoice: Invoice,
    pub client_name: Option<String>,
}

/// Creation form. Tax and total are always computed server-side from
/// the pre-tax amount and rate; callers cannot supply them. A payment
/// date is required exactly when the status is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub contract_id: i64,
    pub client_id: i64,
    pub client_kind: ClientKind,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub pre_tax_amount: f64,
    pub tax_rate: f64,
    pub description: Option<String>,
    pub payment_method: String,
    pub status: InvoiceStatus,
    pub payment_date: Option<NaiveDate>,
}

impl NewInvoice {
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            invoice_number: get_str(record, "invoice_number"),
            contract_id: get_int(record, "contract_id")?
                .ok_or_else(|| CoreError::coercion("contract_id", "missing value"))?,
            client_id: get_int(record, "client_id")?
                .ok_or_else(|| CoreError::coercion("client_id", "missing value"))?,
            client_kind: get_kind_required(record)?,
            invoice_date: get_date(record, "invoice_date")?
                .ok_or_else(|| CoreError::coercion("invoice_date", "missing value"))?,
            due_date: get_date(record, "due_date")?
                .ok_or_else(|| CoreError::coercion("due_date", "missing value"))?,
            period_start: get_date(record, "period_start")?,
            period_end: get_date(record, "period_end")?,
            pre_tax_amount: get_float(record, "pre_tax_amount")?.unwrap_or(0.0),
            tax_rate: get_float(record, "tax_rate")?.unwrap_or(20.0),
            description: get_opt(record, "description"),
            payment_method: get_opt(record, "payment_method")
                .unwrap_or_else(|| "transfer".to_string()),
            status: get_status(record)?.unwrap_or(InvoiceStatus::Pending),
            payment_date: get_date(record, "payment_date")?,
        })
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.invoice_number.trim().is_empty() {
            errors.push("invoice number is required".to_string());
        }
        if self.pre_tax_amount <= 0.0 {
            errors.push("pre-tax amount must be greater than zero".to_string());
        }
        if self.tax_rate < 0.0 {
            errors.push("tax rate cannot be negative".to_string());
        }
        if self.due_date < self.invoice_date {
            errors.push("due date cannot precede the invoice date".to_string());
        }
        // A payment date exists exactly when the invoice is paid.
        match (self.status, self.payment_date) {
            (InvoiceStatus::Paid, None) => {
                errors.push("a paid invoice requires a payment date".to_string());
            }
            (status, Some(_)) if status != InvoiceStatus::Paid => {
                errors.push("a payment date requires paid status".to_string());
            }
            _ => {}
        }
        errors
    }
}

/// Partial update. `tax_amount`/`total_amount` are absent on purpose:
/// they are recomputed from the merged pre-tax amount and rate.
/// `payment_date` uses the empty-string-clears convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoicePatch {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub pre_tax_amount: Option<f64>,
    pub tax_rate: Option<f64>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub payment_date: Option<String>,
}

impl InvoicePatch {
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            invoice_number: record.get("invoice_number").map(|v| v.trim().to_string()),
            invoice_date: get_date(record, "invoice_date")?,
            due_date: get_date(record, "due_date")?,
            period_start: get_date(record, "period_start")?,
            period_end: get_date(record, "period_end")?,
            pre_tax_amount: get_float(record, "pre_tax_amount")?,
            tax_rate: get_float(record, "tax_rate")?,
            description: record.get("description").map(|v| v.trim().to_string()),
            payment_method: record.get("payment_method").map(|v| v.trim().to_string()),
            status: get_status(record)?,
            payment_date: record.get("payment_date").map(|v| v.trim().to_string()),
        })
    }
}

fn get_str(record: &HashMap<String, String>, key: &str) -> String {
    record.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn get_opt(record: &HashMap<String, String>, key: &str) -> Option<String> {
    record
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn get_int(record: &HashMap<String, String>, key: &'static str) -> Result<Option<i64>> {
    match get_opt(record, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| CoreError::coercion(key, format!("'{}' is not an integer", raw))),
    }
}

fn get_float(record: &HashMap<String, String>, key: &'static str) -> Result<Option<f64>> {
    match get_opt(record, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| CoreError::coercion(key, format!("'{}' is not a number", raw))),
    }
}

fn get_date(record: &HashMap<String, String>, key: &'static str) -> Result<Option<NaiveDate>> {
    match get_opt(record, key) {
        None => Ok(None),
        Some(raw) => validation::parse_iso_date(&raw)
            .map(Some)
            .ok_or_else(|| CoreError::coercion(key, format!("'{}' is not a YYYY-MM-DD date", raw))),
    }
}

fn get_status(record: &HashMap<String, String>) -> Result<Option<InvoiceStatus>> {
    match get_opt(record, "status") {
        None => Ok(None),
        Some(raw) => InvoiceStatus::parse(&raw)
            .map(Some)
            .ok_or_else(|| CoreError::coercion("status", format!("unknown status '{}'", raw))),
    }
}

fn get_kind_required(record: &HashMap<String, String>) -> Result<ClientKind> {
    let raw = record
        .get("client_kind")
        .ok_or_else(|| CoreError::coercion("client_kind", "missing value"))?;
    ClientKind::parse(raw)
        .ok_or_else(|| CoreError::coercion("client_kind", format!("unknown kind '{}'", raw.trim())))
}
