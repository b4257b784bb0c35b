/// Clean recognized text before extraction and storage.
/// Strips control characters and stray symbols, trims each line, drops
/// blank lines. Clinical punctuation and units survive.
pub fn clean_recognized_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(
                    c,
                    '.' | ','
                        | ';'
                        | ':'
                        | '-'
                        | '/'
                        | '('
                        | ')'
                        | '%'
                        | '+'
                        | '#'
                        | '\''
                        | '"'
                        | '<'
                        | '>'
                        | '='
                        | '*'
                        | '•'
                        | '°'
                        | 'µ'
                )
        })
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim separator punctuation off a candidate value. Leading colons and
/// dashes are label leftovers; trailing ones are line noise.
pub fn strip_separators(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | ';' | ',' | '.'))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let raw = "Dose: 500mg\x01\x02\nDOB: 15/01/1980\x00";
        let clean = clean_recognized_text(raw);
        assert!(!clean.contains('\x00'));
        assert!(!clean.contains('\x01'));
        assert!(clean.contains("500mg"));
        assert!(clean.contains("15/01/1980"));
    }

    #[test]
    fn preserves_clinical_punctuation() {
        let raw = "Temp: 37.5°C, K+: 4.2 mmol/L (3.5-5.0), CRP <5 µg/mL";
        let clean = clean_recognized_text(raw);
        assert!(clean.contains("37.5°C"));
        assert!(clean.contains("(3.5-5.0)"));
        assert!(clean.contains("<5 µg/mL"));
    }

    #[test]
    fn trims_lines_and_drops_blanks() {
        let raw = "  Patient Name: X  \n\n\n   \nDiagnosis: Y\n";
        assert_eq!(clean_recognized_text(raw), "Patient Name: X\nDiagnosis: Y");
    }

    #[test]
    fn strip_separators_removes_label_leftovers() {
        assert_eq!(strip_separators(": John Smith"), "John Smith");
        assert_eq!(strip_separators(" - A12345 ;"), "A12345");
        assert_eq!(strip_separators("Lisinopril 10mg."), "Lisinopril 10mg");
        assert_eq!(strip_separators("  :- "), "");
    }
}
