//! Field extraction over flat recognized text.
//!
//! Three strategies run unconditionally (collection never short-circuits)
//! and each sighting becomes a [`Candidate`]. Ranking happens once at the
//! end: highest confidence wins, ties resolve to the earlier source line.
//!
//! Confidence scales are strategy-specific and intentionally uncapped: a
//! colon-split hit on an exactly-matching label scores 1.3 and outranks the
//! whole-text pattern at 1.0. Callers must not assume [0, 1].

use tracing::trace;

use super::fields::FieldSpec;
use super::matcher::{label_match_score, FIELD_LABEL_THRESHOLD, STRICT_LABEL_THRESHOLD};
use super::sanitize::strip_separators;
use super::types::Candidate;

/// Confidence boost for a colon-separated label with an inline value.
const COLON_INLINE_BONUS: f32 = 0.3;

/// Confidence boost when the value sits on the line after the label.
const COLON_NEXT_LINE_BONUS: f32 = 0.2;

/// Penalty for a leading-words match that had to reach to the next line.
const NEXT_LINE_PENALTY: f32 = 0.1;

/// Longest leading-token window tried against the variant set.
const MAX_LABEL_WINDOW: usize = 4;

/// Extract one field from flat text: collect from every strategy, rank,
/// take the top value. `None` when no strategy produced a candidate.
pub fn extract_field(text: &str, spec: &FieldSpec) -> Option<String> {
    let mut candidates = collect_candidates(text, spec);
    rank_candidates(&mut candidates);
    candidates.into_iter().next().map(|c| c.value)
}

/// All candidates from all strategies, unranked.
pub fn collect_candidates(text: &str, spec: &FieldSpec) -> Vec<Candidate> {
    let lines: Vec<&str> = text.lines().collect();
    let mut candidates = Vec::new();

    if let Some(candidate) = pattern_candidate(text, spec) {
        candidates.push(candidate);
    }

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let next = lines.get(idx + 1).copied();
        if let Some(candidate) = colon_candidate(line, idx as i32, next, spec.variants) {
            candidates.push(candidate);
        }
        if let Some(candidate) = leading_words_candidate(line, idx as i32, next, spec.variants) {
            candidates.push(candidate);
        }
    }

    trace!(
        field = %spec.key,
        count = candidates.len(),
        "Collected field candidates"
    );
    candidates
}

/// Sort best-first: confidence descending, then earlier source line.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.source_line.cmp(&b.source_line))
    });
}

/// Strategy 0: run the precompiled pattern once over the whole text.
/// A hit is worth exactly 1.0 and carries the -1 source sentinel.
fn pattern_candidate(text: &str, spec: &FieldSpec) -> Option<Candidate> {
    let caps = spec.pattern.captures(text)?;
    let value = strip_separators(caps.get(1)?.as_str());
    if value.is_empty() {
        return None;
    }
    Some(Candidate {
        value,
        confidence: 1.0,
        source_line: -1,
    })
}

/// Strategy 1: split the line on its first colon into (label, value).
fn colon_candidate(
    line: &str,
    idx: i32,
    next_line: Option<&str>,
    variants: &[&str],
) -> Option<Candidate> {
    let (label, rest) = line.split_once(':')?;
    let score = label_match_score(label, variants, FIELD_LABEL_THRESHOLD)?;

    let value = strip_separators(rest);
    if !value.is_empty() {
        return Some(Candidate {
            value,
            confidence: score + COLON_INLINE_BONUS,
            source_line: idx,
        });
    }

    let value = next_line_value(next_line)?;
    Some(Candidate {
        value,
        confidence: score + COLON_NEXT_LINE_BONUS,
        source_line: idx,
    })
}

/// Strategy 2: try windows of 1–4 leading tokens as the label; the
/// remainder of the line is the value. Ties between window sizes go to the
/// longer window (the more specific label).
fn leading_words_candidate(
    line: &str,
    idx: i32,
    next_line: Option<&str>,
    variants: &[&str],
) -> Option<Candidate> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let mut best: Option<(f32, usize)> = None;
    for n in 1..=MAX_LABEL_WINDOW.min(tokens.len()) {
        let window = tokens[..n].join(" ");
        if let Some(score) = label_match_score(&window, variants, STRICT_LABEL_THRESHOLD) {
            if best.map_or(true, |(s, _)| score >= s) {
                best = Some((score, n));
            }
        }
    }
    let (score, n) = best?;

    let value = strip_separators(&tokens[n..].join(" "));
    if !value.is_empty() {
        return Some(Candidate {
            value,
            confidence: score,
            source_line: idx,
        });
    }

    let value = next_line_value(next_line)?;
    Some(Candidate {
        value,
        confidence: score - NEXT_LINE_PENALTY,
        source_line: idx,
    })
}

/// A following line qualifies as a value only if it carries no colon (that
/// would be the next label) and has more than one character.
fn next_line_value(next_line: Option<&str>) -> Option<String> {
    let next = next_line?.trim();
    if next.contains(':') || next.len() <= 1 {
        return None;
    }
    let value = strip_separators(next);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
