//! Extraction orchestrator: preprocess → recognize → extract.
//!
//! Strictly sequential per document. The recognizer call is the sole
//! suspension point; everything else is synchronous over owned or read-only
//! data, so concurrent documents never share state. The recognized document
//! is threaded through as a value; there is no process-wide cache.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::fields::{parse_record_date, FIELD_SPECS};
use super::preprocess::{ImagePreprocessor, ScanBinarizer};
use super::sanitize::clean_recognized_text;
use super::sections::{extract_lab_results, extract_medications};
use super::spatial_fields::{spatial_match, MIN_SPATIAL_CONFIDENCE};
use super::text_fields::{collect_candidates, rank_candidates};
use super::types::{RecognizedDocument, TextRecognizer};
use super::ExtractionError;
use crate::models::{ExtractedRecord, FieldKey, UNKNOWN_VALUE};
use crate::pipeline::diagnostic::{self, DiagnosticTrace, TraceEvent};

/// Review cut-offs for the recognizer-reported overall confidence (0–100).
pub mod thresholds {
    /// Below this: recognition likely failed. Show strong warning.
    pub const VERY_LOW: f32 = 30.0;

    /// Below this: significant uncertainty. Flag all extracted fields.
    pub const LOW: f32 = 50.0;

    /// Below this: some uncertainty. Flag key fields for review.
    pub const MODERATE: f32 = 70.0;

    /// Above this: high confidence. No special flagging.
    pub const HIGH: f32 = 85.0;
}

/// Per-extractor tunables.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Language tag handed to the recognizer untouched.
    pub language: String,
    /// Deadline for one recognizer call. `None` waits indefinitely.
    pub recognize_timeout: Option<Duration>,
    /// Words and lines below this recognizer confidence are ignored by the
    /// spatial strategies.
    pub min_spatial_confidence: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            recognize_timeout: None,
            min_spatial_confidence: MIN_SPATIAL_CONFIDENCE,
        }
    }
}

/// Everything one extraction run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub document_id: Uuid,
    pub record: ExtractedRecord,
    /// Recognizer-reported overall confidence, 0–100. Compare against
    /// [`thresholds`].
    pub overall_confidence: f32,
    pub extracted_at: DateTime<Utc>,
    /// Audit trail of every strategy decision.
    pub trace: DiagnosticTrace,
}

/// Sequences one document through the pipeline. Generic over the
/// recognizer; the preprocessor is injected for testability.
pub struct RecordExtractor<R> {
    recognizer: R,
    preprocessor: Box<dyn ImagePreprocessor>,
    config: ExtractorConfig,
}

impl<R: TextRecognizer> RecordExtractor<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            preprocessor: Box::new(ScanBinarizer::default()),
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn ImagePreprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the full pipeline over one scanned image.
    ///
    /// Preprocessing failure falls back to the unprocessed image. A failed
    /// recognition on the conditioned scan is retried once against the
    /// unprocessed image; a second failure surfaces to the caller, and an
    /// empty record is never fabricated. Field misses are not errors.
    pub async fn extract_record(
        &self,
        document_id: &Uuid,
        image_bytes: &[u8],
    ) -> Result<ExtractionOutcome, ExtractionError> {
        info!(
            document_id = %document_id,
            input_size = image_bytes.len(),
            language = %self.config.language,
            "Starting record extraction"
        );

        let dump_dir = diagnostic::dump_dir_for(document_id);
        let mut trace = DiagnosticTrace::default();

        // Step 1: condition the scan; fall back to the raw image on failure
        let prepared = match self.preprocessor.preprocess(image_bytes) {
            Ok(prepared) => Some(prepared),
            Err(e) => {
                warn!(error = %e, "Preprocessing failed, recognizing unprocessed image");
                trace.record(TraceEvent::PreprocessingFailed {
                    reason: e.to_string(),
                });
                None
            }
        };
        if let (Some(dir), Some(p)) = (&dump_dir, &prepared) {
            diagnostic::dump_binary(dir, "01-preprocessed.png", &p.png_bytes);
        }
        let scan_bytes: &[u8] = prepared
            .as_ref()
            .map(|p| p.png_bytes.as_slice())
            .unwrap_or(image_bytes);

        // Step 2: recognize; one retry against the unprocessed image
        let document = match self.recognize_with_deadline(scan_bytes).await {
            Ok(document) => document,
            Err(e) if prepared.is_some() => {
                warn!(error = %e, "Recognition failed on conditioned scan, retrying unprocessed");
                trace.record(TraceEvent::RecognitionRetried {
                    reason: e.to_string(),
                });
                self.recognize_with_deadline(image_bytes).await?
            }
            Err(e) => return Err(e),
        };
        if let Some(dir) = &dump_dir {
            diagnostic::dump_json(dir, "02-recognized.json", &document);
        }

        // Step 3: clean the recognized text
        let cleaned = clean_recognized_text(&document.full_text);
        if cleaned.is_empty() {
            warn!(document_id = %document_id, "Recognizer produced no usable text");
            trace.record(TraceEvent::EmptyDocument);
        }

        // Step 4: typed fields, spatial primary with text fallback
        let mut fields = BTreeMap::new();
        for spec in FIELD_SPECS.iter() {
            let value = self.extract_one_field(&document, &cleaned, spec.key, &mut trace);
            fields.insert(spec.key, value.unwrap_or_else(|| UNKNOWN_VALUE.to_string()));
        }

        // Step 5: ordered section lists
        let medications = extract_medications(&cleaned);
        trace.record(TraceEvent::SectionExtracted {
            section: "medications".into(),
            items: medications.len(),
        });
        let lab_results = extract_lab_results(&cleaned);
        trace.record(TraceEvent::SectionExtracted {
            section: "lab_results".into(),
            items: lab_results.len(),
        });

        let record = ExtractedRecord {
            fields,
            medications,
            lab_results,
            cleaned_text: cleaned,
        };
        let outcome = ExtractionOutcome {
            document_id: *document_id,
            record,
            overall_confidence: document.confidence,
            extracted_at: Utc::now(),
            trace,
        };
        if let Some(dir) = &dump_dir {
            diagnostic::dump_json(dir, "03-outcome.json", &outcome);
        }

        info!(
            document_id = %document_id,
            confidence = outcome.overall_confidence,
            known_fields = outcome
                .record
                .fields
                .values()
                .filter(|v| *v != UNKNOWN_VALUE)
                .count(),
            medications = outcome.record.medications.len(),
            lab_results = outcome.record.lab_results.len(),
            "Record extraction complete"
        );
        Ok(outcome)
    }

    /// One field through the strategy stack. Spatial wins outright when it
    /// fires; otherwise the ranked text candidates decide.
    fn extract_one_field(
        &self,
        document: &RecognizedDocument,
        cleaned: &str,
        key: FieldKey,
        trace: &mut DiagnosticTrace,
    ) -> Option<String> {
        let spec = super::fields::field_spec(key);

        let value = match spatial_match(document, spec, self.config.min_spatial_confidence) {
            Some(hit) => {
                trace.record(TraceEvent::FieldResolved {
                    field: key,
                    strategy: hit.strategy.as_str().to_string(),
                    value: hit.value.clone(),
                    confidence: document.confidence,
                });
                Some(hit.value)
            }
            None => {
                let mut candidates = collect_candidates(cleaned, spec);
                rank_candidates(&mut candidates);
                if candidates.is_empty() {
                    trace.record(TraceEvent::FieldMissed { field: key });
                    None
                } else {
                    let top = candidates.remove(0);
                    let strategy = if top.source_line < 0 {
                        "text:pattern"
                    } else {
                        "text:line"
                    };
                    trace.record(TraceEvent::FieldResolved {
                        field: key,
                        strategy: strategy.to_string(),
                        value: top.value.clone(),
                        confidence: top.confidence,
                    });
                    if !candidates.is_empty() {
                        trace.record(TraceEvent::CandidatesRejected {
                            field: key,
                            candidates,
                        });
                    }
                    Some(top.value)
                }
            }
        };

        if key == FieldKey::DateOfBirth {
            if let Some(v) = &value {
                if parse_record_date(v).is_none() {
                    trace.record(TraceEvent::ImplausibleDate {
                        field: key,
                        value: v.clone(),
                    });
                }
            }
        }

        value
    }

    async fn recognize_with_deadline(
        &self,
        image_bytes: &[u8],
    ) -> Result<RecognizedDocument, ExtractionError> {
        match self.config.recognize_timeout {
            Some(limit) => tokio::time::timeout(
                limit,
                self.recognizer.recognize(image_bytes, &self.config.language),
            )
            .await
            .map_err(|_| ExtractionError::RecognitionTimeout(limit))?,
            None => {
                self.recognizer
                    .recognize(image_bytes, &self.config.language)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::preprocess::{encode_png, FailingPreprocessor};
    use crate::pipeline::extraction::recognizer::MockRecognizer;
    use crate::pipeline::extraction::types::{BoundingBox, RecognizedWord};
    use image::{Rgb, RgbImage};

    /// Small decodable scan for the real preprocessor.
    fn tiny_scan() -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            if (20..44).contains(&x) && (28..36).contains(&y) {
                Rgb([30, 30, 30])
            } else {
                Rgb([200, 200, 200])
            }
        });
        encode_png(&img).unwrap()
    }

    fn referral_text() -> &'static str {
        "Patient Name: John Smith\n\
         MRN: A12345\n\
         DOB: 15/01/1980\n\
         Diagnosis: Hypertension\n\
         MEDICATIONS:\n\
         A) Aspirin 81mg\n\
         B. Lisinopril 10mg\n\
         CLINICAL DATA: CBC; BMP; LFT"
    }

    #[tokio::test]
    async fn full_pipeline_over_text_document() {
        let recognizer = MockRecognizer::new(RecognizedDocument::from_text(referral_text(), 88.0));
        let extractor = RecordExtractor::new(recognizer);
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, &tiny_scan()).await.unwrap();
        let record = &outcome.record;

        assert_eq!(record.field(FieldKey::PatientName), "John Smith");
        assert_eq!(record.field(FieldKey::PatientId), "A12345");
        assert_eq!(record.field(FieldKey::DateOfBirth), "15/01/1980");
        assert_eq!(record.field(FieldKey::Diagnosis), "Hypertension");
        assert_eq!(record.medications, vec!["Aspirin 81mg", "Lisinopril 10mg"]);
        assert_eq!(record.lab_results, vec!["CBC", "BMP", "LFT"]);
        assert_eq!(outcome.document_id, id);
        assert_eq!(outcome.overall_confidence, 88.0);
    }

    #[tokio::test]
    async fn preprocessing_failure_falls_back_to_raw_image() {
        let recognizer = MockRecognizer::new(RecognizedDocument::from_text(referral_text(), 75.0));
        let extractor = RecordExtractor::new(recognizer)
            .with_preprocessor(Box::new(FailingPreprocessor));
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, b"not an image at all").await.unwrap();

        assert!(outcome.record.is_known(FieldKey::PatientName));
        assert!(outcome
            .trace
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::PreprocessingFailed { .. })));
    }

    #[tokio::test]
    async fn recognition_failure_retries_on_unprocessed_image() {
        let recognizer = MockRecognizer::new(RecognizedDocument::from_text(referral_text(), 70.0))
            .failing_first(1);
        let extractor = RecordExtractor::new(recognizer);
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, &tiny_scan()).await.unwrap();

        assert!(outcome.record.is_known(FieldKey::PatientId));
        assert!(outcome
            .trace
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::RecognitionRetried { .. })));
        assert_eq!(extractor.recognizer.call_count(), 2);
    }

    #[tokio::test]
    async fn persistent_recognition_failure_surfaces() {
        let extractor = RecordExtractor::new(MockRecognizer::unavailable());
        let id = Uuid::new_v4();

        let result = extractor.extract_record(&id, &tiny_scan()).await;

        assert!(matches!(result, Err(ExtractionError::Recognition(_))));
        assert_eq!(extractor.recognizer.call_count(), 2, "one retry, then surface");
    }

    #[tokio::test]
    async fn slow_recognizer_hits_timeout() {
        let recognizer = MockRecognizer::new(RecognizedDocument::from_text("x", 50.0))
            .with_delay(Duration::from_millis(250));
        let extractor = RecordExtractor::new(recognizer).with_config(ExtractorConfig {
            recognize_timeout: Some(Duration::from_millis(5)),
            ..ExtractorConfig::default()
        });
        let id = Uuid::new_v4();

        let result = extractor.extract_record(&id, &tiny_scan()).await;
        assert!(matches!(result, Err(ExtractionError::RecognitionTimeout(_))));
    }

    #[tokio::test]
    async fn empty_document_yields_sentinel_record() {
        let recognizer = MockRecognizer::new(RecognizedDocument::from_text("", 10.0));
        let extractor = RecordExtractor::new(recognizer);
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, &tiny_scan()).await.unwrap();

        for key in FieldKey::ALL {
            assert_eq!(outcome.record.field(key), UNKNOWN_VALUE);
        }
        assert!(outcome.record.medications.is_empty());
        assert!(outcome.record.lab_results.is_empty());
        assert!(outcome
            .trace
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::EmptyDocument)));
    }

    #[tokio::test]
    async fn spatial_value_takes_priority_over_text() {
        // Geometry says A12345; the flat text says TEXTVAL. Geometry wins.
        let words = vec![
            RecognizedWord {
                text: "MRN".into(),
                bbox: BoundingBox::new(60.0, 50.0, 100.0, 62.0),
                confidence: 70.0,
            },
            RecognizedWord {
                text: "A12345".into(),
                bbox: BoundingBox::new(130.0, 52.0, 200.0, 64.0),
                confidence: 75.0,
            },
        ];
        let document = RecognizedDocument {
            full_text: "MRN: TEXTVAL".into(),
            confidence: 80.0,
            lines: vec![crate::pipeline::extraction::types::RecognizedLine {
                text: "MRN A12345".into(),
                bbox: BoundingBox::new(60.0, 50.0, 200.0, 64.0),
                confidence: 80.0,
                words: vec![],
            }],
            words,
            blocks: vec![],
        };
        let extractor = RecordExtractor::new(MockRecognizer::new(document));
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, &tiny_scan()).await.unwrap();
        assert_eq!(outcome.record.field(FieldKey::PatientId), "A12345");
        assert!(outcome.trace.events.iter().any(|e| matches!(
            e,
            TraceEvent::FieldResolved { field: FieldKey::PatientId, strategy, .. }
                if strategy == "spatial:horizontal_proximity"
        )));
    }

    #[tokio::test]
    async fn implausible_date_is_flagged_not_rewritten() {
        let recognizer =
            MockRecognizer::new(RecognizedDocument::from_text("DOB: 31/02/1980", 82.0));
        let extractor = RecordExtractor::new(recognizer);
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, &tiny_scan()).await.unwrap();

        assert_eq!(outcome.record.field(FieldKey::DateOfBirth), "31/02/1980");
        assert!(outcome
            .trace
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::ImplausibleDate { .. })));
    }

    #[tokio::test]
    async fn rejected_candidates_survive_in_trace() {
        let text = "Diagnosis: Hypertension\nDx: Alternate reading";
        let recognizer = MockRecognizer::new(RecognizedDocument::from_text(text, 90.0));
        let extractor = RecordExtractor::new(recognizer);
        let id = Uuid::new_v4();

        let outcome = extractor.extract_record(&id, &tiny_scan()).await.unwrap();

        assert_eq!(outcome.record.field(FieldKey::Diagnosis), "Hypertension");
        let rejected = outcome
            .trace
            .for_field(FieldKey::Diagnosis)
            .any(|e| matches!(e, TraceEvent::CandidatesRejected { .. }));
        assert!(rejected, "losing candidates should be auditable");
    }
}
