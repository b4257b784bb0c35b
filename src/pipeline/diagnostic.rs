//! Structured audit trail for extraction decisions, plus an optional
//! artifact dump to disk.
//!
//! Every intermediate decision (chosen strategy, matched values,
//! confidences, rejected candidates) is recorded as a trace event so a
//! human can audit why a record came out the way it did. The trace never
//! affects returned values.
//!
//! **Dump activation**: set `CHARTLIFT_DUMP_DIR` and each run writes
//! numbered artifacts under `{dump_dir}/{document_id}/`:
//!
//! ```text
//! {dump_dir}/{doc_id}/
//!   01-preprocessed.png
//!   02-recognized.json
//!   03-outcome.json
//! ```
//!
//! Dump failures log a warning and never fail the pipeline.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::models::FieldKey;
use crate::pipeline::extraction::types::Candidate;

// ──────────────────────────────────────────────
// In-memory trace
// ──────────────────────────────────────────────

/// One extraction run's audit trail, in decision order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticTrace {
    pub events: Vec<TraceEvent>,
}

impl DiagnosticTrace {
    pub fn record(&mut self, event: TraceEvent) {
        tracing::trace!(?event, "Trace event");
        self.events.push(event);
    }

    /// Events concerning one field, for targeted audit.
    pub fn for_field(&self, key: FieldKey) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter().filter(move |e| e.field() == Some(key))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Preprocessing failed; recognition ran on the unprocessed image.
    PreprocessingFailed { reason: String },
    /// First recognition attempt failed; retried on the unprocessed image.
    RecognitionRetried { reason: String },
    /// The recognizer produced no usable text.
    EmptyDocument,
    /// A field resolved, with the strategy that won.
    FieldResolved {
        field: FieldKey,
        strategy: String,
        value: String,
        confidence: f32,
    },
    /// No strategy produced a candidate; the field took the sentinel.
    FieldMissed { field: FieldKey },
    /// Candidates that lost the ranking, kept for audit.
    CandidatesRejected {
        field: FieldKey,
        candidates: Vec<Candidate>,
    },
    /// A date field resolved to a value that does not parse as a real date.
    ImplausibleDate { field: FieldKey, value: String },
    /// A section list was extracted.
    SectionExtracted { section: String, items: usize },
}

impl TraceEvent {
    fn field(&self) -> Option<FieldKey> {
        match self {
            TraceEvent::FieldResolved { field, .. }
            | TraceEvent::FieldMissed { field }
            | TraceEvent::CandidatesRejected { field, .. }
            | TraceEvent::ImplausibleDate { field, .. } => Some(*field),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Artifact dump
// ──────────────────────────────────────────────

/// Resolve the base dump directory from `CHARTLIFT_DUMP_DIR`.
/// `None` means dumping is disabled.
fn resolve_base_dir() -> Option<PathBuf> {
    std::env::var("CHARTLIFT_DUMP_DIR").ok().map(PathBuf::from)
}

/// Returns the dump directory for a document, or `None` if diagnostics are
/// disabled. Creates the directory tree on first call; returns `None` with
/// a warning if creation fails; never panics, never blocks the pipeline.
pub fn dump_dir_for(doc_id: &Uuid) -> Option<PathBuf> {
    let base = resolve_base_dir()?;
    let dir = base.join(doc_id.to_string());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }

    Some(dir)
}

/// Write a binary artifact (PNG image, raw bytes). Never panics.
pub fn dump_binary(dir: &Path, filename: &str, data: &[u8]) {
    let path = dir.join(filename);
    if let Err(e) = std::fs::write(&path, data) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write binary"
        );
    }
}

/// Write a JSON artifact (any serde-serializable value), pretty-printed
/// for human reading. Never panics.
pub fn dump_json<T: Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&path, json.as_bytes()) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Diagnostic dump: failed to write JSON"
                );
            }
        }
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize artifact"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_filters_by_field() {
        let mut trace = DiagnosticTrace::default();
        trace.record(TraceEvent::FieldResolved {
            field: FieldKey::PatientName,
            strategy: "text:colon".into(),
            value: "X".into(),
            confidence: 1.3,
        });
        trace.record(TraceEvent::FieldMissed {
            field: FieldKey::Diagnosis,
        });
        trace.record(TraceEvent::EmptyDocument);

        assert_eq!(trace.for_field(FieldKey::PatientName).count(), 1);
        assert_eq!(trace.for_field(FieldKey::Diagnosis).count(), 1);
        assert_eq!(trace.for_field(FieldKey::PatientId).count(), 0);
        assert_eq!(trace.events.len(), 3);
    }

    #[test]
    fn trace_serializes_with_event_kinds() {
        let mut trace = DiagnosticTrace::default();
        trace.record(TraceEvent::ImplausibleDate {
            field: FieldKey::DateOfBirth,
            value: "31/02/1980".into(),
        });
        let json = serde_json::to_string(&trace).unwrap();
        assert!(json.contains("\"kind\":\"implausible_date\""));
        assert!(json.contains("\"date_of_birth\""));
    }

    #[test]
    fn dump_respects_env_toggle() {
        // Disabled by default (the variable is not inherited from the
        // harness), enabled once the variable points somewhere writable.
        std::env::remove_var("CHARTLIFT_DUMP_DIR");
        let id = Uuid::new_v4();
        assert!(dump_dir_for(&id).is_none());

        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("CHARTLIFT_DUMP_DIR", tmp.path());
        let dir = dump_dir_for(&id).expect("dump dir resolves");
        assert!(dir.ends_with(id.to_string()));

        dump_json(&dir, "03-outcome.json", &serde_json::json!({"ok": true}));
        assert!(dir.join("03-outcome.json").exists());
        std::env::remove_var("CHARTLIFT_DUMP_DIR");
    }
}
