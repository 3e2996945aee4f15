//! Text normalization and bounding helpers shared by extraction and persistence.

use regex::Regex;
use std::sync::LazyLock;

/// Marker appended when free text is cut at a length boundary.
pub const CONTINUATION_MARKER: &str = "...";

/// Marker appended when a description is cut on a line break.
pub const DESCRIPTION_CONTINUES: &str = "\n\n[...description continues...]";

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ANY_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SPACE_AROUND_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BLANK_LINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n(?:\s*\n)+").expect("valid regex"));

/// Replace every run of line breaks with a single space.
pub fn strip_line_breaks(text: &str) -> String {
    LINE_BREAKS.replace_all(text, " ").trim().to_string()
}

/// Collapse all whitespace (including newlines) to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    ANY_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Collapse spaces and tabs, trim every line, and limit blank lines to one,
/// keeping paragraph breaks.
pub fn tidy_paragraphs(text: &str) -> String {
    let text = HORIZONTAL_SPACE.replace_all(text, " ");
    let text = SPACE_AROUND_BREAK.replace_all(&text, "\n");
    BLANK_LINE_RUNS.replace_all(&text, "\n\n").trim().to_string()
}

/// Truncate to at most `max_chars` characters, appending `marker` when cut.
///
/// Counts characters, not bytes, so multi-byte text never splits mid-codepoint.
///
/// # Examples
/// ```
/// use vacancy_harvester::text::truncate_with_marker;
///
/// assert_eq!(truncate_with_marker("abcdef", 3, "..."), "abc...");
/// assert_eq!(truncate_with_marker("abc", 3, "..."), "abc");
/// ```
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{marker}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Truncate a long description, preferring to cut on the last line break before
/// `max_chars` as long as that keeps at least `min_keep` characters.
pub fn truncate_on_line_break(text: &str, max_chars: usize, min_keep: usize) -> String {
    let Some((limit_byte, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let head = &text[..limit_byte];
    if let Some(break_byte) = head.rfind('\n') {
        if head[..break_byte].chars().count() > min_keep {
            return format!("{}{DESCRIPTION_CONTINUES}", &head[..break_byte]);
        }
    }

    format!("{head}{CONTINUATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_breaks() {
        assert_eq!(strip_line_breaks("a\r\nb\n\nc"), "a b c");
        assert_eq!(strip_line_breaks("\nhello\n"), "hello");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n\n c "), "a b c");
    }

    #[test]
    fn test_tidy_paragraphs() {
        assert_eq!(tidy_paragraphs("a  b\n\n\n\nc\t\td"), "a b\n\nc d");
        assert_eq!(tidy_paragraphs("one \n  two\n \n\n three"), "one\ntwo\n\nthree");
    }

    #[test]
    fn test_truncate_with_marker_multibyte() {
        assert_eq!(truncate_with_marker("ééééé", 2, "..."), "éé...");
    }

    #[test]
    fn test_truncate_on_line_break_prefers_break() {
        let text = format!("{}\n{}", "a".repeat(20), "b".repeat(20));
        let cut = truncate_on_line_break(&text, 30, 10);
        assert_eq!(cut, format!("{}{}", "a".repeat(20), DESCRIPTION_CONTINUES));
    }

    #[test]
    fn test_truncate_on_line_break_hard_cut_when_break_too_early() {
        let text = format!("ab\n{}", "c".repeat(40));
        let cut = truncate_on_line_break(&text, 30, 10);
        assert!(cut.ends_with(CONTINUATION_MARKER));
        assert_eq!(cut.chars().count(), 30 + CONTINUATION_MARKER.len());
    }

    #[test]
    fn test_truncate_on_line_break_short_text_untouched() {
        assert_eq!(truncate_on_line_break("short", 30, 10), "short");
    }
}
