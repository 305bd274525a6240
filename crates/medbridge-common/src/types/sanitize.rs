//! Free-text normalization
//!
//! Labels end up in a CSV bulk-load stream and in file-system friendly
//! exports, so path separators, brackets and control characters never reach
//! the stores.

/// Normalize a free-text label before storage
///
/// `/` and `\` become `-`, `[`/`]` become `(`/`)` and control characters
/// become spaces. Nothing else changes, surrounding whitespace included.
/// An empty result means "no label".
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            '[' => '(',
            ']' => ')',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

/// Replace embedded line breaks with spaces for bulk-load fields
pub fn strip_line_breaks(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        std::borrow::Cow::Owned(value.replace(['\r', '\n'], " "))
    } else {
        std::borrow::Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_separators_and_brackets() {
        assert_eq!(
            sanitize_label("Acetaminophen 325 MG / Oxycodone [Percocet]"),
            "Acetaminophen 325 MG - Oxycodone (Percocet)"
        );
        assert_eq!(sanitize_label(r"a\b"), "a-b");
    }

    #[test]
    fn test_sanitize_removes_control_characters() {
        assert_eq!(sanitize_label("Hyper\ttension\r\n"), "Hyper tension  ");
        assert_eq!(sanitize_label(""), "");
    }

    #[test]
    fn test_sanitize_keeps_surrounding_whitespace() {
        assert_eq!(sanitize_label(" Asthma "), " Asthma ");
    }

    #[test]
    fn test_strip_line_breaks_borrows_clean_values() {
        assert!(matches!(strip_line_breaks("clean"), std::borrow::Cow::Borrowed(_)));
        assert_eq!(strip_line_breaks("two\r\nlines"), "two  lines");
    }
}
