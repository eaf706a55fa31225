//! Contract entity types, patches and the expiry classifier.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::client::ClientKind;
use crate::error::{CoreError, Result};
use crate::validation;

/// Commercial duration convention: one month of service is 30 days.
const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Pending,
    Suspended,
    Terminated,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "pending" => Some(Self::Pending),
            "suspended" => Some(Self::Suspended),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contract {
    pub id: i64,
    pub contract_number: String,
    pub client_id: i64,
    pub client_kind: ClientKind,
    pub service_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_months: i64,
    pub monthly_amount: f64,
    pub opening_fee: f64,
    pub deposit: f64,
    pub included_services: Option<String>,
    pub conditions: Option<String>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

/// A contract joined with its client's display fields, for listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContractDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub contract: Contract,
    pub client_name: Option<String>,
    pub client_identifier: Option<String>,
    pub client_phone: Option<String>,
}

/// End date derived from the 30-days-per-month convention.
pub fn end_date_from(start_date: NaiveDate, duration_months: i64) -> NaiveDate {
    start_date + Duration::days(DAYS_PER_MONTH * duration_months)
}

/// Creation form. `end_date` may be supplied explicitly; when absent
/// it is derived from `start_date` and `duration_months`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContract {
    pub contract_number: String,
    pub client_id: i64,
    pub client_kind: ClientKind,
    pub service_type: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub duration_months: i64,
    pub monthly_amount: f64,
    pub opening_fee: f64,
    pub deposit: f64,
    pub included_services: Option<String>,
    pub conditions: Option<String>,
    pub status: ContractStatus,
}

impl NewContract {
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            contract_number: str_field(record, "contract_number"),
            client_id: int_field(record, "client_id")?
                .ok_or_else(|| CoreError::coercion("client_id", "missing value"))?,
            client_kind: kind_field(record)?,
            service_type: str_field(record, "service_type"),
            start_date: date_field(record, "start_date")?
                .ok_or_else(|| CoreError::coercion("start_date", "missing value"))?,
            end_date: date_field(record, "end_date")?,
            duration_months: int_field(record, "duration_months")?.unwrap_or(12),
            monthly_amount: float_field(record, "monthly_amount")?.unwrap_or(0.0),
            opening_fee: float_field(record, "opening_fee")?.unwrap_or(0.0),
            deposit: float_field(record, "deposit")?.unwrap_or(0.0),
            included_services: opt_field(record, "included_services"),
            conditions: opt_field(record, "conditions"),
            status: status_field(record)?.unwrap_or(ContractStatus::Active),
        })
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.contract_number.trim().is_empty() {
            errors.push("contract number is required".to_string());
        }
        if self.service_type.trim().is_empty() {
            errors.push("service type is required".to_string());
        }
        if self.monthly_amount <= 0.0 {
            errors.push("monthly amount must be greater than zero".to_string());
        }
        if self.duration_months <= 0 {
            errors.push("duration must be at least one month".to_string());
        }
        if self.opening_fee < 0.0 {
            errors.push("opening fee cannot be negative".to_string());
        }
        if self.deposit < 0.0 {
            errors.push("deposit cannot be negative".to_string());
        }
        errors
    }
}

/// Partial update. `end_date` is deliberately absent: it is always
/// recomputed from the merged start date and duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractPatch {
    pub contract_number: Option<String>,
    pub client_id: Option<i64>,
    pub client_kind: Option<ClientKind>,
    pub service_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub duration_months: Option<i64>,
    pub monthly_amount: Option<f64>,
    pub opening_fee: Option<f64>,
    pub deposit: Option<f64>,
    pub included_services: Option<String>,
    pub conditions: Option<String>,
    pub status: Option<ContractStatus>,
}

impl ContractPatch {
    /// Coerce a string record into a typed patch. Each field that
    /// fails coercion produces its own distinct error.
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            contract_number: record.get("contract_number").map(|v| v.trim().to_string()),
            client_id: int_field(record, "client_id")?,
            client_kind: match record.get("client_kind") {
                None => None,
                Some(raw) => Some(ClientKind::parse(raw).ok_or_else(|| {
                    CoreError::coercion("client_kind", format!("unknown kind '{}'", raw.trim()))
                })?),
            },
            service_type: record.get("service_type").map(|v| v.trim().to_string()),
            start_date: date_field(record, "start_date")?,
            duration_months: int_field(record, "duration_months")?,
            monthly_amount: float_field(record, "monthly_amount")?,
            opening_fee: float_field(record, "opening_fee")?,
            deposit: float_field(record, "deposit")?,
            included_services: record.get("included_services").map(|v| v.trim().to_string()),
            conditions: record.get("conditions").map(|v| v.trim().to_string()),
            status: status_field(record)?,
        })
    }
}

/// Outcome of a contract deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteOutcome {
    /// No payments referenced the contract; the row is gone.
    Deleted,
    /// Payments existed; the row was kept and forced to `terminated`.
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Seven days or less remaining.
    Critical,
    /// Thirty days or less remaining.
    Warning,
}

/// Display classification of a contract's lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired { days_overdue: i64 },
    ExpiringSoon { days_left: i64, urgency: Urgency },
    Active,
    /// A non-active stored status is shown verbatim.
    Inactive { status: ContractStatus },
}

impl ExpiryStatus {
    pub fn color(&self) -> &'static str {
        match self {
            Self::Expired { .. } => "red",
            Self::ExpiringSoon { urgency: Urgency::Critical, .. } => "red",
            Self::ExpiringSoon { urgency: Urgency::Warning, .. } => "orange",
            Self::Active => "green",
            Self::Inactive { status } => match status {
                ContractStatus::Terminated => "red",
                ContractStatus::Suspended => "orange",
                ContractStatus::Pending => "blue",
                ContractStatus::Active => "green",
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Expired { days_overdue } => format!("Expired {} day(s) ago", days_overdue),
            Self::ExpiringSoon { days_left, .. } => format!("Expires in {} day(s)", days_left),
            Self::Active => "Active".to_string(),
            Self::Inactive { status } => status.to_string(),
        }
    }
}

/// Classify a contract for display against an explicit `today`.
///
/// Only contracts stored as Active are measured against their end
/// date; any other stored status is reported as-is.
pub fn expiry_status(
    end_date: NaiveDate,
    stored: ContractStatus,
    today: NaiveDate,
) -> ExpiryStatus {
    if stored != ContractStatus::Active {
        return ExpiryStatus::Inactive { status: stored };
    }
    let days_left = dom_common::days_until(today, end_date);
    if days_left < 0 {
        ExpiryStatus::Expired { days_overdue: -days_left }
    } else if days_left <= 7 {
        ExpiryStatus::ExpiringSoon { days_left, urgency: Urgency::Critical }
    } else if days_left <= 30 {
        ExpiryStatus::ExpiringSoon { days_left, urgency: Urgency::Warning }
    } else {
        ExpiryStatus::Active
    }
}

fn str_field(record: &HashMap<String, String>, key: &str) -> String {
    record.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn opt_field(record: &HashMap<String, String>, key: &str) -> Option<String> {
    record
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn int_field(record: &HashMap<String, String>, key: &'static str) -> Result<Option<i64>> {
    match opt_field(record, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| CoreError::coercion(key, format!("'{}' is not an integer", raw))),
    }
}

fn float_field(record: &HashMap<String, String>, key: &'static str) -> Result<Option<f64>> {
    match opt_field(record, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| CoreError::coercion(key, format!("'{}' is not a number", raw))),
    }
}

fn date_field(record: &HashMap<String, String>, key: &'static str) -> Result<Option<NaiveDate>> {
    match opt_field(record, key) {
        None => Ok(None),
        Some(raw) => validation::parse_iso_date(&raw)
            .map(Some)
            .ok_or_else(|| CoreError::coercion(key, format!("'{}' is not a YYYY-MM-DD date", raw))),
    }
}

fn kind_field(record: &HashMap<String, String>) -> Result<ClientKind> {
    let raw = record
        .get("client_kind")
        .ok_or_else(|| CoreError::coercion("client_kind", "missing value"))?;
    ClientKind::parse(raw)
        .ok_or_else(|| CoreError::coercion("client_kind", format!("unknown kind '{}'", raw.trim())))
}

fn status_field(record: &HashMap<String, String>) -> Result<Option<ContractStatus>> {
    match opt_field(record, "status") {
        None => Ok(None),
        Some(raw) => ContractStatus::parse(&raw)
            .map(Some)
            .ok_or_else(|| CoreError::coercion("status", format!("unknown status '{}'", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_end_date_uses_thirty_day_months() {
        // 12 months of 30 days lands short of the calendar year.
        assert_eq!(end_date_from(date(2025, 1, 1), 12), date(2025, 12, 27));
        assert_eq!(end_date_from(date(2025, 1, 1), 1), date(2025, 1, 31));
    }

    #[test]
    fn test_expiry_tiers_for_active_contracts() {
        let today = date(2025, 6, 15);
        assert_eq!(
            expiry_status(date(2025, 6, 10), ContractStatus::Active, today),
            ExpiryStatus::Expired { days_overdue: 5 }
        );
        assert_eq!(
            expiry_status(date(2025, 6, 22), ContractStatus::Active, today),
            ExpiryStatus::ExpiringSoon { days_left: 7, urgency: Urgency::Critical }
        );
        assert_eq!(
            expiry_status(date(2025, 7, 15), ContractStatus::Active, today),
            ExpiryStatus::ExpiringSoon { days_left: 30, urgency: Urgency::Warning }
        );
        assert_eq!(
            expiry_status(date(2025, 7, 16), ContractStatus::Active, today),
            ExpiryStatus::Active
        );
        // Expiring today is critical, not expired.
        assert_eq!(
            expiry_status(today, ContractStatus::Active, today),
            ExpiryStatus::ExpiringSoon { days_left: 0, urgency: Urgency::Critical }
        );
    }

    #[test]
    fn test_non_active_statuses_reported_verbatim() {
        let today = date(2025, 6, 15);
        // Even with a future end date, a suspended contract shows as suspended.
        let status = expiry_status(date(2026, 1, 1), ContractStatus::Suspended, today);
        assert_eq!(status, ExpiryStatus::Inactive { status: ContractStatus::Suspended });
        assert_eq!(status.color(), "orange");
        assert_eq!(
            expiry_status(date(2024, 1, 1), ContractStatus::Terminated, today).color(),
            "red"
        );
        assert_eq!(
            expiry_status(date(2026, 1, 1), ContractStatus::Pending, today).color(),
            "blue"
        );
    }

    #[test]
    fn test_patch_coercion_failures_are_per_field() {
        let mut record = HashMap::new();
        record.insert("monthly_amount".to_string(), "abc".to_string());
        let err = ContractPatch::from_record(&record).unwrap_err();
        assert!(matches!(err, CoreError::Coercion { field: "monthly_amount", .. }));

        let mut record = HashMap::new();
        record.insert("start_date".to_string(), "2025-13-40".to_string());
        let err = ContractPatch::from_record(&record).unwrap_err();
        assert!(matches!(err, CoreError::Coercion { field: "start_date", .. }));
    }

    #[test]
    fn test_new_contract_from_record_defaults() {
        let mut record = HashMap::new();
        record.insert("contract_number".to_string(), "DOM-202501-0001".to_string());
        record.insert("client_id".to_string(), "3".to_string());
        record.insert("client_kind".to_string(), "corporate".to_string());
        record.insert("service_type".to_string(), "Standard".to_string());
        record.insert("start_date".to_string(), "2025-01-01".to_string());
        record.insert("monthly_amount".to_string(), "300".to_string());

        let form = NewContract::from_record(&record).unwrap();
        assert_eq!(form.duration_months, 12);
        assert_eq!(form.status, ContractStatus::Active);
        assert_eq!(form.end_date, None);
        assert!(form.validate().is_empty());
    }
}
