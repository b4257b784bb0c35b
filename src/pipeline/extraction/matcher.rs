//! Fuzzy label matching against known label-variant sets.
//!
//! Recognized labels arrive noisy ("Pat1ent Nane:", "D0B"), so matching runs
//! cheapest-first: exact equality of normalized forms, then substring
//! containment in either direction, then edit-distance similarity against
//! the threshold. The threshold varies by call site.

use super::similarity::{normalize, similarity};

/// Section headers tolerate the most noise.
pub const SECTION_HEADER_THRESHOLD: f32 = 0.5;

/// Inline field labels ("Patient Name:", "MRN:").
pub const FIELD_LABEL_THRESHOLD: f32 = 0.6;

/// Short labels where a loose match would misfire ("DOB" vs "DOE").
pub const STRICT_LABEL_THRESHOLD: f32 = 0.7;

/// Does `text` match any of `variants` at the given threshold?
pub fn is_label_match(text: &str, variants: &[&str], threshold: f32) -> bool {
    label_match_score(text, variants, threshold).is_some()
}

/// Best match score across `variants`, or `None` when nothing matches.
///
/// Exact equality of normalized forms scores 1.0; containment and fuzzy
/// matches score the edit-distance similarity of the normalized forms. A
/// text whose normalized form is empty never matches at any threshold.
pub fn label_match_score(text: &str, variants: &[&str], threshold: f32) -> Option<f32> {
    let norm = normalize(text);
    if norm.is_empty() {
        return None;
    }

    let mut best: Option<f32> = None;
    for variant in variants {
        let v = normalize(variant);
        if v.is_empty() {
            continue;
        }

        if norm == v {
            return Some(1.0);
        }

        let contained = norm.contains(&v) || v.contains(&norm);
        let sim = similarity(&norm, &v);
        if contained || sim >= threshold {
            best = Some(best.map_or(sim, |b: f32| b.max(sim)));
        }
    }

    best
}
