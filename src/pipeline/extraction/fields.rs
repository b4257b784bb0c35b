//! Data-driven field specification table.
//!
//! Patterns are precompiled once and live for the process; extraction logic
//! never carries inline literals, so a pattern change touches only this
//! table. Each pattern has exactly one capture group: the value.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::FieldKey;

/// Canonical field key, its label-variant set, and the one extraction
/// pattern the whole-text strategy runs.
pub struct FieldSpec {
    pub key: FieldKey,
    pub variants: &'static [&'static str],
    pub pattern: Regex,
}

pub static FIELD_SPECS: LazyLock<Vec<FieldSpec>> = LazyLock::new(|| {
    vec![
        FieldSpec {
            key: FieldKey::PatientName,
            variants: &["patient name", "name", "patient", "pt name"],
            // Name tokens after a patient label, up to an age marker or line end.
            pattern: compile(r"(?im)patient\s*name\s*[:\-]*\s*([a-z][a-z .,'\-]*?)\s*(?:\bage\b|$)"),
        },
        FieldSpec {
            key: FieldKey::PatientId,
            variants: &["patient id", "mrn", "medical record number", "record no", "id"],
            pattern: compile(
                r"(?im)(?:mrn|patient\s*id|medical\s*record\s*(?:no|number))\s*[:#.\-]*\s*([a-z0-9][a-z0-9\-]*)",
            ),
        },
        FieldSpec {
            key: FieldKey::DateOfBirth,
            variants: &["date of birth", "dob", "birth date", "d o b"],
            // Digits in DD/MM/YYYY form following a DOB label.
            pattern: compile(
                r"(?im)(?:dob|date\s*of\s*birth|birth\s*date)\s*[:.\-]*\s*(\d{2}/\d{2}/\d{4})",
            ),
        },
        FieldSpec {
            key: FieldKey::Diagnosis,
            variants: &["diagnosis", "dx", "impression", "clinical impression"],
            pattern: compile(r"(?im)(?:diagnosis|dx|impression)\s*[:.\-]*\s*([^\r\n]+)"),
        },
    ]
});

/// Look up the spec for a field key.
pub fn field_spec(key: FieldKey) -> &'static FieldSpec {
    FIELD_SPECS
        .iter()
        .find(|s| s.key == key)
        .expect("every field key has a spec entry")
}

/// Parse a DD/MM/YYYY value. Used to flag implausible dates in the
/// diagnostic trace; the extracted value itself is never rewritten.
pub fn parse_record_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%d/%m/%Y").ok()
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("field table pattern is valid")
}
