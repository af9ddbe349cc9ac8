//! Severity tiers for PII types.
//!
//! Classification is a static table lookup, normalised on the way in.
//! Unknown types fall back to [`Severity::Low`] so a detection is never
//! silently dropped.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::entity::DetectedEntity;

/// Impact tier of a PII type.  Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Types whose exposure is directly exploitable (financial, identity,
/// credentials, health).
const HIGH_TYPES: &[&str] = &[
    "CREDIT_CARD",
    "CARD_NUMBER",
    "IBAN",
    "IBAN_CODE",
    "BANK_ACCOUNT",
    "SSN",
    "NIR",
    "SOCIAL_SECURITY",
    "PASSPORT",
    "PASSPORT_NUMBER",
    "DRIVING_LICENCE",
    "DRIVER_LICENSE",
    "NHS_NUMBER",
    "HEALTH_ID",
    "MEDICAL_RECORD",
    "PASSWORD",
    "API_KEY",
    "SECRET_KEY",
    "ACCESS_TOKEN",
];

/// Types that identify or locate a person but are not directly exploitable.
const MEDIUM_TYPES: &[&str] = &[
    "EMAIL",
    "EMAIL_ADDRESS",
    "PHONE",
    "PHONE_NUMBER",
    "ADDRESS",
    "POSTAL_ADDRESS",
    "DATE_OF_BIRTH",
    "BIRTH_DATE",
    "IP_ADDRESS",
    "GEOLOCATION",
    "LOCATION",
];

impl Severity {
    /// Classify a PII type label.  Input is trimmed and upper-cased before
    /// lookup; anything unrecognised maps to `Low`.
    pub fn classify(pii_type: &str) -> Severity {
        let normalised = pii_type.trim().to_uppercase();
        if HIGH_TYPES.contains(&normalised.as_str()) {
            Severity::High
        } else if MEDIUM_TYPES.contains(&normalised.as_str()) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// Per-tier tallies for one (scan, space) pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl SeverityCounts {
    /// Fold [`Severity::classify`] over a slice of detected entities.
    pub fn aggregate(entities: &[DetectedEntity]) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for entity in entities {
            match Severity::classify(&entity.pii_type) {
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.high == 0 && self.medium == 0 && self.low == 0
    }

    pub fn total(&self) -> u64 {
        self.high + self.medium + self.low
    }
}

impl Add for SeverityCounts {
    type Output = SeverityCounts;

    fn add(self, rhs: SeverityCounts) -> SeverityCounts {
        SeverityCounts {
            high: self.high + rhs.high,
            medium: self.medium + rhs.medium,
            low: self.low + rhs.low,
        }
    }
}

impl AddAssign for SeverityCounts {
    fn add_assign(&mut self, rhs: SeverityCounts) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DetectedEntity;

    fn entity(pii_type: &str) -> DetectedEntity {
        DetectedEntity {
            start: 0,
            end: 4,
            pii_type: pii_type.to_string(),
            type_label: pii_type.to_string(),
            confidence: 0.9,
            sensitive_value: "1234".to_string(),
            sensitive_context: String::new(),
            masked_context: String::new(),
        }
    }

    #[test]
    fn classify_is_case_and_whitespace_insensitive() {
        assert_eq!(Severity::classify("credit_card"), Severity::High);
        assert_eq!(Severity::classify("  Iban  "), Severity::High);
        assert_eq!(Severity::classify("Email_Address"), Severity::Medium);
    }

    #[test]
    fn unknown_types_default_to_low() {
        assert_eq!(Severity::classify("SOMETHING_NEW"), Severity::Low);
        assert_eq!(Severity::classify(""), Severity::Low);
    }

    #[test]
    fn ordering_puts_high_first() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn aggregate_counts_every_entity() {
        let entities = vec![
            entity("CREDIT_CARD"),
            entity("EMAIL"),
            entity("PERSON"),
            entity("PASSWORD"),
        ];
        let counts = SeverityCounts::aggregate(&entities);
        assert_eq!(counts.high, 2);
        assert_eq!(counts.medium, 1);
        assert_eq!(counts.low, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn counts_add_componentwise() {
        let a = SeverityCounts { high: 1, medium: 2, low: 3 };
        let b = SeverityCounts { high: 4, medium: 0, low: 1 };
        assert_eq!(a + b, SeverityCounts { high: 5, medium: 2, low: 4 });
    }
}
