//! Recipient phone normalization.
//!
//! The messaging provider expects E.164 digits without the `+`: country code
//! first, 8 to 15 digits in total, no leading zero.

use serde::{Deserialize, Serialize};

use leasekeep_core::{DomainError, DomainResult, ValueObject};

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// A validated, country-code-prefixed phone number (digits only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl ValueObject for PhoneNumber {}

impl PhoneNumber {
    /// Normalize a phone number as typed into the back office.
    ///
    /// Separators (spaces, dashes, dots, parentheses) are dropped, and a leading
    /// `+` or `00` international prefix is removed. A number in national format
    /// (single leading `0`) is rewritten with `default_country_code` when one is
    /// given; without it, the number is rejected.
    pub fn parse(raw: &str, default_country_code: Option<&str>) -> DomainResult<Self> {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\u{a0}'))
            .collect();

        let digits = if let Some(rest) = compact.strip_prefix('+') {
            rest.to_string()
        } else if let Some(rest) = compact.strip_prefix("00") {
            rest.to_string()
        } else if let Some(rest) = compact.strip_prefix('0') {
            match default_country_code {
                Some(cc) => format!("{}{rest}", cc.trim_start_matches('+')),
                None => {
                    return Err(DomainError::validation(
                        "phone number is in national format and no default country code is configured",
                    ));
                }
            }
        } else {
            compact
        };

        if digits.is_empty() {
            return Err(DomainError::validation("phone number is empty"));
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation("phone number must contain digits only"));
        }
        if digits.starts_with('0') {
            return Err(DomainError::validation("phone number must start with a country code"));
        }
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(DomainError::validation(format!(
                "phone number must have {MIN_DIGITS}-{MAX_DIGITS} digits (got {})",
                digits.len()
            )));
        }

        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
