//! Ordered list extraction for medication and lab-result sections.
//!
//! A section is the contiguous line run between a recognized header and the
//! next differing recognized header. Entry is fuzzy (recognizers mangle
//! headers); exit is keyword-prefix based so an unrelated section always
//! terminates the scan.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::matcher::{is_label_match, SECTION_HEADER_THRESHOLD};
use super::sanitize::strip_separators;
use super::similarity::normalize;

/// Header variants opening the medication section.
pub const MEDICATION_HEADERS: &[&str] = &[
    "medications",
    "current medications",
    "medication list",
    "meds",
    "prescriptions",
    "active medications",
];

/// Header variants opening the lab-result section.
pub const LAB_HEADERS: &[&str] = &[
    "lab results",
    "laboratory results",
    "labs",
    "lab data",
    "clinical data",
    "test results",
];

/// Normalized keywords that mark the start of *some* section. Hitting one
/// that is not part of the current header set ends the scan.
const SECTION_KEYWORDS: &[&str] = &[
    "medications",
    "medication list",
    "meds",
    "prescriptions",
    "lab results",
    "laboratory results",
    "labs",
    "clinical data",
    "test results",
    "diagnosis",
    "assessment",
    "plan",
    "history",
    "allergies",
    "impression",
    "physical exam",
    "vitals",
    "instructions",
    "follow up",
];

/// Leading list markers: bullets, "1." / "2)" numerals, "A)" / "B." letters.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•·‣]+|\(?\d{1,2}[.)]|\(?[A-Za-z][.)])\s*").expect("marker pattern is valid")
});

/// Entries below this length are recognition debris, not list items.
const MIN_ITEM_LEN: usize = 3;

/// Ordered medication entries from cleaned text.
pub fn extract_medications(text: &str) -> Vec<String> {
    let items = extract_section_list(text, MEDICATION_HEADERS);
    debug!(count = items.len(), "Medication section extracted");
    items
}

/// Ordered lab-result entries from cleaned text.
///
/// A dedicated "CLINICAL DATA:" capture runs first (many referral forms
/// carry labs as a delimited run rather than a listed section), with the
/// generic section scan as the fallback.
pub fn extract_lab_results(text: &str) -> Vec<String> {
    let items = clinical_data_capture(text)
        .unwrap_or_else(|| extract_section_list(text, LAB_HEADERS));
    debug!(count = items.len(), "Lab result section extracted");
    items
}

/// Generic boundary scan shared by both sections.
pub fn extract_section_list(text: &str, headers: &[&str]) -> Vec<String> {
    let mut items = Vec::new();
    let mut in_section = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if !in_section {
            if let Some(rest) = header_line(line, headers) {
                in_section = true;
                // Items may share the header line after the colon.
                if let Some(item) = section_item(rest) {
                    items.push(item);
                }
            }
            continue;
        }

        if starts_other_section(line, headers) {
            break;
        }
        if let Some(item) = section_item(line) {
            items.push(item);
        }
    }

    items
}

/// Does this line open one of our sections? Returns the remainder after the
/// colon (possibly empty). Matching runs on the text before the first colon
/// so trailing inline content cannot dilute the header.
fn header_line<'a>(line: &'a str, headers: &[&str]) -> Option<&'a str> {
    let (head, rest) = match line.split_once(':') {
        Some((head, rest)) => (head, rest),
        None => (line, ""),
    };
    is_label_match(head, headers, SECTION_HEADER_THRESHOLD).then_some(rest)
}

/// A line starting with a recognized keyword of a *different* section ends
/// the current one.
fn starts_other_section(line: &str, current_headers: &[&str]) -> bool {
    let norm = normalize(line);
    SECTION_KEYWORDS.iter().any(|kw| {
        norm.starts_with(kw) && !current_headers.iter().any(|h| normalize(h).starts_with(kw))
    })
}

/// Strip the list marker and qualify the entry: long enough, and not a bare
/// "Label:" header.
fn section_item(line: &str) -> Option<String> {
    let unmarked = LIST_MARKER.replace(line.trim(), "");
    let item = unmarked.trim();
    if item.len() < MIN_ITEM_LEN {
        return None;
    }
    // Bare header: label then colon, nothing after.
    if let Some((_, rest)) = item.split_once(':') {
        if rest.trim().is_empty() {
            return None;
        }
    }
    Some(item.to_string())
}

/// Dedicated "CLINICAL DATA:" capture: the remainder of the header line
/// plus following lines up to the next section, split on semicolons, else
/// commas, else whitespace. `None` when the header is absent or yields no
/// entries, so the caller can fall back to the generic scan.
fn clinical_data_capture(text: &str) -> Option<Vec<String>> {
    static CLINICAL_HEADER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^\s*clinical\s*data\s*:?\s*(.*)$").expect("clinical pattern is valid")
    });

    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| CLINICAL_HEADER.is_match(l))?;

    let mut items = Vec::new();
    if let Some(caps) = CLINICAL_HEADER.captures(lines[start]) {
        items.extend(split_delimited_run(caps.get(1).map_or("", |m| m.as_str())));
    }
    for line in &lines[start + 1..] {
        let line = line.trim();
        if line.is_empty() || starts_other_section(line, &["clinical data"]) {
            break;
        }
        items.extend(split_delimited_run(line));
    }

    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Split on the strongest delimiter present: semicolon, then comma, then
/// whitespace.
fn split_delimited_run(run: &str) -> Vec<String> {
    let parts: Vec<&str> = if run.contains(';') {
        run.split(';').collect()
    } else if run.contains(',') {
        run.split(',').collect()
    } else {
        run.split_whitespace().collect()
    };

    parts
        .into_iter()
        .map(strip_separators)
        .filter(|p| !p.is_empty())
        .collect()
}
