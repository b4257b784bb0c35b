//! Field extraction over word/line geometry.
//!
//! Three strategies try in order and the first success wins; unlike the
//! text chain there is no cross-strategy ranking, because geometry already
//! encodes the layout evidence. A document without spatial data is declined
//! outright and the caller falls back to the text strategies.
//!
//! The pixel tolerances are fixed defaults reflecting typical scanned-form
//! geometry, not tuned guarantees.

use serde::Serialize;
use tracing::debug;

use super::fields::FieldSpec;
use super::matcher::{is_label_match, FIELD_LABEL_THRESHOLD, STRICT_LABEL_THRESHOLD};
use super::sanitize::strip_separators;
use super::similarity::{normalize, similarity};
use super::types::{RecognizedDocument, RecognizedLine, RecognizedWord};

/// Words and lines below this recognizer confidence are ignored.
pub const MIN_SPATIAL_CONFIDENCE: f32 = 60.0;

/// Max left-edge offset between a label line and the value line below it.
pub const VERTICAL_X_TOLERANCE: f32 = 50.0;

/// How far right of a label's edge a value may start.
pub const HORIZONTAL_REACH: f32 = 300.0;

/// Max top-edge offset between a label word and its same-row value.
pub const HORIZONTAL_Y_TOLERANCE: f32 = 20.0;

/// Word-level similarity bar when locating the label word inside a line.
const WORD_MATCH_SIMILARITY: f32 = 0.7;

/// Which geometric strategy produced a value. Recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialStrategy {
    SameLine,
    VerticalPair,
    HorizontalProximity,
}

impl SpatialStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialStrategy::SameLine => "spatial:same_line",
            SpatialStrategy::VerticalPair => "spatial:vertical_pair",
            SpatialStrategy::HorizontalProximity => "spatial:horizontal_proximity",
        }
    }
}

/// A successful geometric extraction.
#[derive(Debug, Clone, Serialize)]
pub struct SpatialMatch {
    pub value: String,
    pub strategy: SpatialStrategy,
}

/// Extract one field from document geometry, or `None` when the document
/// lacks spatial data or no strategy fires.
pub fn extract_field_spatially(
    document: &RecognizedDocument,
    spec: &FieldSpec,
    min_confidence: f32,
) -> Option<String> {
    spatial_match(document, spec, min_confidence).map(|m| m.value)
}

/// Like [`extract_field_spatially`] but keeps the winning strategy for the
/// diagnostic trace.
pub fn spatial_match(
    document: &RecognizedDocument,
    spec: &FieldSpec,
    min_confidence: f32,
) -> Option<SpatialMatch> {
    if !document.has_spatial_data() {
        return None;
    }

    let hit = same_line_value(&document.lines, spec.variants, min_confidence)
        .map(|value| SpatialMatch {
            value,
            strategy: SpatialStrategy::SameLine,
        })
        .or_else(|| {
            vertical_pair_value(&document.lines, spec.variants, min_confidence).map(|value| {
                SpatialMatch {
                    value,
                    strategy: SpatialStrategy::VerticalPair,
                }
            })
        })
        .or_else(|| {
            horizontal_proximity_value(&document.words, spec.variants, min_confidence).map(
                |value| SpatialMatch {
                    value,
                    strategy: SpatialStrategy::HorizontalProximity,
                },
            )
        });

    if let Some(ref m) = hit {
        debug!(field = %spec.key, strategy = ?m.strategy, "Spatial strategy resolved field");
    }
    hit
}

/// Label and value on one line: find the last word still belonging to the
/// label, take the confident words after it as the value.
fn same_line_value(lines: &[RecognizedLine], variants: &[&str], min_confidence: f32) -> Option<String> {
    for line in lines {
        if line.confidence < min_confidence || line.words.len() < 2 {
            continue;
        }
        let line_norm = normalize(&line.text);
        if !variants.iter().any(|v| line_norm.contains(&normalize(v))) {
            continue;
        }

        let Some(label_end) = last_label_word_index(&line.words, variants) else {
            continue;
        };

        let joined = line.words[label_end + 1..]
            .iter()
            .filter(|w| w.confidence >= min_confidence)
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let value = strip_separators(&joined);
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

/// Index of the last contiguous label word, e.g. `Name:` in
/// `Patient Name: John Smith`. A word belongs to the label when its
/// normalized text is contained in a variant (or vice versa) or sits above
/// the word-similarity bar.
fn last_label_word_index(words: &[RecognizedWord], variants: &[&str]) -> Option<usize> {
    let mut last = None;
    for (i, word) in words.iter().enumerate() {
        let w = normalize(&word.text);
        if w.is_empty() {
            continue;
        }
        let is_label_word = variants.iter().any(|v| {
            let v = normalize(v);
            v.contains(&w) || w.contains(&v) || similarity(&w, &v) > WORD_MATCH_SIMILARITY
        });
        if is_label_word {
            last = Some(i);
        } else if last.is_some() {
            break;
        }
    }
    last
}

/// Label line directly above the value line, left edges aligned.
fn vertical_pair_value(
    lines: &[RecognizedLine],
    variants: &[&str],
    min_confidence: f32,
) -> Option<String> {
    for pair in lines.windows(2) {
        let (label, below) = (&pair[0], &pair[1]);
        if label.confidence < min_confidence || below.confidence < min_confidence {
            continue;
        }
        if !is_label_match(&label.text, variants, FIELD_LABEL_THRESHOLD) {
            continue;
        }
        if (label.bbox.x0 - below.bbox.x0).abs() < VERTICAL_X_TOLERANCE {
            let value = strip_separators(&below.text);
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Label word with value words in the band to its right.
fn horizontal_proximity_value(
    words: &[RecognizedWord],
    variants: &[&str],
    min_confidence: f32,
) -> Option<String> {
    for label in words {
        if label.confidence < min_confidence {
            continue;
        }
        if !is_label_match(&label.text, variants, STRICT_LABEL_THRESHOLD) {
            continue;
        }

        let right = label.bbox.x1;
        let mut picks: Vec<&RecognizedWord> = words
            .iter()
            .filter(|w| {
                w.confidence >= min_confidence
                    && w.bbox.x0 > right
                    && w.bbox.x0 < right + HORIZONTAL_REACH
                    && (w.bbox.y0 - label.bbox.y0).abs() <= HORIZONTAL_Y_TOLERANCE
            })
            .collect();
        if picks.is_empty() {
            continue;
        }

        picks.sort_by(|a, b| {
            a.bbox
                .x0
                .partial_cmp(&b.bbox.x0)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let joined = picks
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let value = strip_separators(&joined);
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}
