use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel stored for a field no strategy could resolve.
/// An extraction miss is not an error; downstream consumers render this as-is.
pub const UNKNOWN_VALUE: &str = "N/A";

/// Canonical keys of the typed record fields.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    PatientName,
    PatientId,
    DateOfBirth,
    Diagnosis,
}

impl FieldKey {
    pub const ALL: [FieldKey; 4] = [
        FieldKey::PatientName,
        FieldKey::PatientId,
        FieldKey::DateOfBirth,
        FieldKey::Diagnosis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::PatientName => "patient_name",
            FieldKey::PatientId => "patient_id",
            FieldKey::DateOfBirth => "date_of_birth",
            FieldKey::Diagnosis => "diagnosis",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of one extraction run. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Field key → extracted value, or [`UNKNOWN_VALUE`] on a miss.
    pub fields: BTreeMap<FieldKey, String>,
    /// Medication entries in document order.
    pub medications: Vec<String>,
    /// Lab-result entries in document order.
    pub lab_results: Vec<String>,
    /// Full recognized text after sanitization.
    pub cleaned_text: String,
}

impl ExtractedRecord {
    /// Value for a field, falling back to the unknown sentinel.
    pub fn field(&self, key: FieldKey) -> &str {
        self.fields
            .get(&key)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_VALUE)
    }

    /// True when the field resolved to a real value.
    pub fn is_known(&self, key: FieldKey) -> bool {
        self.field(key) != UNKNOWN_VALUE
    }
}
