//! Field-level validation rules.
//!
//! Identifier formats follow Moroccan conventions: the national
//! identity card number (two letters, six digits), the 15-digit
//! corporate tax identifier, and local or +212 phone numbers.

use regex::Regex;
use std::sync::OnceLock;

fn identity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2}[0-9]{6}$").unwrap())
}

fn tax_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{15}$").unwrap())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
    })
}

fn local_phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0[5-7][0-9]{8}$").unwrap())
}

fn intl_phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?212[5-7][0-9]{8}$").unwrap())
}

/// Canonical form of an identity number: trimmed and uppercased.
pub fn canonical_identity_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Identity card number: exactly two letters followed by six digits.
pub fn is_valid_identity_number(raw: &str) -> bool {
    identity_pattern().is_match(&canonical_identity_number(raw))
}

/// Canonical form of a corporate tax identifier: digits only, spaces removed.
pub fn canonical_tax_id(raw: &str) -> String {
    raw.trim().replace(' ', "")
}

/// Corporate tax identifier: exactly 15 digits once spaces are stripped.
pub fn is_valid_tax_id(raw: &str) -> bool {
    tax_id_pattern().is_match(&canonical_tax_id(raw))
}

/// Email format check. An empty value is acceptable since email is optional.
pub fn is_valid_email(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || email_pattern().is_match(trimmed)
}

/// Canonical form of a phone number: spaces, dashes and dots removed.
pub fn canonical_phone(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect()
}

/// Phone number: local `0[5-7]XXXXXXXX` or international `+212`/`212` form.
pub fn is_valid_phone(raw: &str) -> bool {
    let canonical = canonical_phone(raw);
    local_phone_pattern().is_match(&canonical) || intl_phone_pattern().is_match(&canonical)
}

/// Date strings are stored as ISO `YYYY-MM-DD`.
pub fn parse_iso_date(raw: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
