//! Client entity types, creation forms and update patches.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::validation;

/// Discriminant for the two client tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ClientKind {
    Individual,
    Corporate,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Corporate => "corporate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "individual" => Some(Self::Individual),
            "corporate" => Some(Self::Corporate),
            _ => None,
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A natural person domiciling an activity at the office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndividualClient {
    pub id: i64,
    pub surname: String,
    pub given_name: String,
    pub sex: Option<String>,
    pub identity_number: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl IndividualClient {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.surname, self.given_name)
    }
}

/// A company domiciling its registered office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CorporateClient {
    pub id: i64,
    pub legal_name: String,
    pub tax_id: String,
    pub registration_number: Option<String>,
    pub legal_form: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub rep_surname: Option<String>,
    pub rep_given_name: Option<String>,
    pub rep_identity_number: Option<String>,
    pub rep_capacity: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Either kind of client, for cross-cutting reads such as search.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Client {
    Individual(IndividualClient),
    Corporate(CorporateClient),
}

impl Client {
    pub fn id(&self) -> i64 {
        match self {
            Self::Individual(c) => c.id,
            Self::Corporate(c) => c.id,
        }
    }

    pub fn kind(&self) -> ClientKind {
        match self {
            Self::Individual(_) => ClientKind::Individual,
            Self::Corporate(_) => ClientKind::Corporate,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Individual(c) => c.display_name(),
            Self::Corporate(c) => c.legal_name.clone(),
        }
    }

    /// The unique business identifier: identity number or tax id.
    pub fn unique_identifier(&self) -> &str {
        match self {
            Self::Individual(c) => &c.identity_number,
            Self::Corporate(c) => &c.tax_id,
        }
    }

    pub fn phone(&self) -> &str {
        match self {
            Self::Individual(c) => &c.phone,
            Self::Corporate(c) => &c.phone,
        }
    }
}

fn record_value(record: &HashMap<String, String>, key: &str) -> String {
    record.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn record_opt(record: &HashMap<String, String>, key: &str) -> Option<String> {
    record
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn record_date(record: &HashMap<String, String>, key: &'static str) -> Result<Option<NaiveDate>> {
    match record_opt(record, key) {
        None => Ok(None),
        Some(raw) => validation::parse_iso_date(&raw)
            .map(Some)
            .ok_or_else(|| CoreError::coercion(key, format!("'{}' is not a YYYY-MM-DD date", raw))),
    }
}

/// Creation form for an individual client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIndividualClient {
    pub surname: String,
    pub given_name: String,
    pub sex: Option<String>,
    pub identity_number: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl NewIndividualClient {
    /// Build a form from a plain field-name → value record, as handed
    /// over by presentation layers. Values are trimmed; empty optional
    /// fields become `None`.
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            surname: record_value(record, "surname"),
            given_name: record_value(record, "given_name"),
            sex: record_opt(record, "sex"),
            identity_number: record_value(record, "identity_number"),
            phone: record_value(record, "phone"),
            email: record_opt(record, "email"),
            address: record_opt(record, "address"),
            birth_date: record_date(record, "birth_date")?,
        })
    }

    /// Canonical storage form: trimmed fields, uppercased identity number.
    pub fn normalized(&self) -> Self {
        Self {
            surname: self.surname.trim().to_string(),
            given_name: self.given_name.trim().to_string(),
            sex: self.sex.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            identity_number: validation::canonical_identity_number(&self.identity_number),
            phone: self.phone.trim().to_string(),
            email: self.email.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            address: self.address.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            birth_date: self.birth_date,
        }
    }

    /// All validation failures for this form, empty when acceptable.
    /// Call on the [`normalized`](Self::normalized) form.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.surname.chars().count() < 2 {
            errors.push("surname must be at least 2 characters".to_string());
        }
        if self.given_name.chars().count() < 2 {
            errors.push("given name must be at least 2 characters".to_string());
        }
        if !validation::is_valid_identity_number(&self.identity_number) {
            errors.push(format!(
                "invalid identity number '{}' (expected 2 letters + 6 digits)",
                self.identity_number
            ));
        }
        if validation::canonical_phone(&self.phone).chars().count() < 10
            || !validation::is_valid_phone(&self.phone)
        {
            errors.push(format!("invalid phone number '{}'", self.phone));
        }
        if let Some(email) = &self.email {
            if !validation::is_valid_email(email) {
                errors.push(format!("invalid email '{}'", email));
            }
        }
        if let Some(sex) = &self.sex {
            if !matches!(sex.as_str(), "M" | "F" | "Other") {
                errors.push("sex must be one of M, F, Other".to_string());
            }
        }
        errors
    }
}

/// Creation form for a corporate client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCorporateClient {
    pub legal_name: String,
    pub tax_id: String,
    pub registration_number: Option<String>,
    pub legal_form: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub rep_surname: Option<String>,
    pub rep_given_name: Option<String>,
    pub rep_identity_number: Option<String>,
    pub rep_capacity: Option<String>,
}

impl NewCorporateClient {
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            legal_name: record_value(record, "legal_name"),
            tax_id: record_value(record, "tax_id"),
            registration_number: record_opt(record, "registration_number"),
            legal_form: record_opt(record, "legal_form"),
            phone: record_value(record, "phone"),
            email: record_opt(record, "email"),
            address: record_opt(record, "address"),
            rep_surname: record_opt(record, "rep_surname"),
            rep_given_name: record_opt(record, "rep_given_name"),
            rep_identity_number: record_opt(record, "rep_identity_number"),
            rep_capacity: record_opt(record, "rep_capacity"),
        })
    }

    pub fn normalized(&self) -> Self {
        let opt = |v: &Option<String>| {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
        };
        Self {
            legal_name: self.legal_name.trim().to_string(),
            tax_id: validation::canonical_tax_id(&self.tax_id),
            registration_number: opt(&self.registration_number),
            legal_form: opt(&self.legal_form),
            phone: self.phone.trim().to_string(),
            email: opt(&self.email),
            address: opt(&self.address),
            rep_surname: opt(&self.rep_surname),
            rep_given_name: opt(&self.rep_given_name),
            rep_identity_number: opt(&self.rep_identity_number)
                .map(|v| validation::canonical_identity_number(&v)),
            rep_capacity: opt(&self.rep_capacity),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.legal_name.chars().count() < 3 {
            errors.push("legal name must be at least 3 characters".to_string());
        }
        if !validation::is_valid_tax_id(&self.tax_id) {
            errors.push(format!(
                "invalid tax identifier '{}' (expected 15 digits)",
                self.tax_id
            ));
        }
        if validation::canonical_phone(&self.phone).chars().count() < 10
            || !validation::is_valid_phone(&self.phone)
        {
            errors.push(format!("invalid phone number '{}'", self.phone));
        }
        if let Some(email) = &self.email {
            if !validation::is_valid_email(email) {
                errors.push(format!("invalid email '{}'", email));
            }
        }
        if let Some(rep_identity) = &self.rep_identity_number {
            if !validation::is_valid_identity_number(rep_identity) {
                errors.push(format!(
                    "invalid representative identity number '{}'",
                    rep_identity
                ));
            }
        }
        errors
    }
}

/// Partial update for an individual client. `None` means "leave the
/// field alone"; for optional columns an empty string clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndividualPatch {
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub sex: Option<String>,
    pub identity_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    /// ISO date string; empty clears the stored date.
    pub birth_date: Option<String>,
}

impl IndividualPatch {
    pub fn from_record(record: &HashMap<String, String>) -> Self {
        let get = |key: &str| record.get(key).map(|v| v.trim().to_string());
        Self {
            surname: get("surname"),
            given_name: get("given_name"),
            sex: get("sex"),
            identity_number: get("identity_number"),
            phone: get("phone"),
            email: get("email"),
            address: get("address"),
            birth_date: get("birth_date"),
        }
    }
}

/// Partial update for a corporate client, same conventions as
/// [`IndividualPatch`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorporatePatch {
    pub legal_name: Option<String>,
    pub tax_id: Option<String>,
    pub registration_number: Option<String>,
    pub legal_form: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub rep_surname: Option<String>,
    pub rep_given_name: Option<String>,
    pub rep_identity_number: Option<String>,
    pub rep_capacity: Option<String>,
}

impl CorporatePatch {
    pub fn from_record(record: &HashMap<String, String>) -> Self {
        let get = |key: &str| record.get(key).map(|v| v.trim().to_string());
        Self {
            legal_name: get("legal_name"),
            tax_id: get("tax_id"),
            registration_number: get("registration_number"),
            legal_form: get("legal_form"),
            phone: get("phone"),
            email: get("email"),
            address: get("address"),
            rep_surname: get("rep_surname"),
            rep_given_name: get("rep_given_name"),
            rep_identity_number: get("rep_identity_number"),
            rep_capacity: get("rep_capacity"),
        }
    }
}
