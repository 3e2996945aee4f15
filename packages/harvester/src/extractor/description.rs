//! Description extraction: locate the body of the posting between the
//! contact block and the page footer, strip script noise and restructure
//! the recognized sub-headers.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::{tidy_paragraphs, truncate_on_line_break};

/// Descriptions are cut at this many characters.
pub const DESCRIPTION_MAX_CHARS: usize = 1500;

/// A line-break cut is only used if it keeps more than this many characters.
pub const DESCRIPTION_MIN_KEEP: usize = 1000;

/// The posting body starts right after the contact button.
pub const START_MARKER: &str = "Chat on WhatsApp";

/// Shorter primary candidates trigger the content-pattern fallback.
const PRIMARY_MIN_CHARS: usize = 100;

/// Shorter candidates trigger the middle-slice fallback.
const FALLBACK_MIN_CHARS: usize = 50;

/// Header markers; the middle slice starts after the last one found.
const HEADER_MARKERS: &[&str] = &[START_MARKER, "Contact", "Phone:", "Email:"];

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static END_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:Back|Next|Email to a Friend|Page View Count|NEVER PAY ANY KIND|",
        r"Facebook|Twitter|Print|Report|Previous|Following|Search Jobs)\b|©\s*\d{4}"
    ))
    .expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static FOOTER_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Back|Next|Email to a Friend)\b|©\s*\d{4}").expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static CONTENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:Hiring|We are looking|Job Details|Position)").expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\(adsbygoogle[^)]*\)[^;]*;",
        r"window\.__CF\$cv\$params[^}]*\}",
        r"document\.createElement[^;]*;",
        r"googletag\.cmd[^;]*;",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SUB_HEADERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)(?:📋\s*)?Job Details:\s*", "\n\n📋 Job Details:\n"),
        (r"(?i)(?:✅\s*)?Requirements:\s*", "\n\n✅ Requirements:\n"),
        (r"(?i)(?:🎁\s*)?What We Offer:\s*", "\n\n🎁 What We Offer:\n"),
        (r"(?i)(?:📞\s*)?For More Details", "\n\n📞 For More Details"),
        (r"(?i)(?:🏠\s*)?Accommodation:", "\n🏠 Accommodation:"),
        (r"(?i)(?:💰\s*)?Salary:", "\n💰 Salary:"),
        (r"(?i)(?:📱\s*)?Contact:", "\n📱 Contact:"),
    ]
    .into_iter()
    .map(|(p, r)| (Regex::new(p).expect("valid regex"), r))
    .collect()
});

/// Text from `from` up to the first end marker.
fn until_end_marker(text: &str) -> &str {
    let end = END_MARKERS.find(text).map_or(text.len(), |m| m.start());
    &text[..end]
}

/// Everything between the start marker and the first end marker.
fn after_start_marker(text: &str) -> Option<&str> {
    let start = text.find(START_MARKER)? + START_MARKER.len();
    Some(until_end_marker(&text[start..]).trim())
}

/// From the first opening phrase up to the first end marker.
fn from_content_start(text: &str) -> Option<&str> {
    let start = CONTENT_START.find(text)?.start();
    Some(until_end_marker(&text[start..]).trim())
}

/// Slice between the last header marker and the next footer marker.
fn middle_slice(text: &str) -> Option<&str> {
    let start = HEADER_MARKERS
        .iter()
        .filter_map(|m| text.find(m).map(|i| i + m.len()))
        .max()
        .unwrap_or(0);
    let end = FOOTER_MARKERS
        .find(&text[start..])
        .map_or(text.len(), |m| start + m.start());
    let slice = text[start..end].trim();
    (slice.chars().count() > PRIMARY_MIN_CHARS).then_some(slice)
}

/// Pick the raw description text using the fallback chain.
pub fn locate(text: &str) -> String {
    let mut description = after_start_marker(text).unwrap_or_default();

    if description.chars().count() < PRIMARY_MIN_CHARS {
        if let Some(candidate) = from_content_start(text) {
            if candidate.len() > description.len() {
                description = candidate;
            }
        }
    }

    if description.chars().count() < FALLBACK_MIN_CHARS {
        if let Some(candidate) = middle_slice(text) {
            description = candidate;
        }
    }

    description.to_string()
}

/// Remove script and ad remnants.
pub fn strip_noise(text: &str) -> String {
    NOISE
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

/// Put the recognized sub-headers on their own lines with a consistent marker.
pub fn restructure(text: &str) -> String {
    let text = SUB_HEADERS
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        });
    tidy_paragraphs(&text)
}

/// The formatted, length-bounded description, empty when nothing was found.
pub fn extract_description(text: &str) -> String {
    let raw = locate(text);
    if raw.is_empty() {
        return String::new();
    }
    let cleaned = tidy_paragraphs(&strip_noise(&raw));
    let structured = restructure(&cleaned);
    truncate_on_line_break(&structured, DESCRIPTION_MAX_CHARS, DESCRIPTION_MIN_KEEP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::DESCRIPTION_CONTINUES;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_description_after_start_marker() {
        let text = "Header stuff\nChat on WhatsApp\nWe need an experienced cashier for a \
                    supermarket in Riyadh. Job Details: day shift, six days a week, \
                    immediate joining.\nBack\nNext";
        assert_eq!(
            extract_description(text),
            "We need an experienced cashier for a supermarket in Riyadh.\n\n\
             📋 Job Details:\nday shift, six days a week, immediate joining."
        );
    }

    #[test]
    fn test_end_markers_are_word_bounded() {
        let text = format!(
            "Chat on WhatsApp\nBackend developer wanted. {} Nextcloud experience a plus.\nBack",
            "x".repeat(90)
        );
        let description = extract_description(&text);
        assert!(description.starts_with("Backend developer"));
        assert!(description.ends_with("Nextcloud experience a plus."));
    }

    #[test]
    fn test_copyright_year_ends_description() {
        let text = format!("Chat on WhatsApp {} © 2026 Site", "y".repeat(120));
        assert_eq!(extract_description(&text), "y".repeat(120));
    }

    #[test]
    fn test_content_pattern_fallback() {
        let text = format!(
            "Menu\nHiring a tailor for our Jeddah workshop. {}\nEmail to a Friend",
            "Sewing and alterations. ".repeat(5)
        );
        let description = extract_description(&text);
        assert!(description.starts_with("Hiring a tailor"));
        assert!(!description.contains("Email to a Friend"));
    }

    #[test]
    fn test_middle_slice_fallback() {
        let body = "z".repeat(150);
        let text = format!("Phone: 0551234567\n{body}\n© 2026");
        assert_eq!(extract_description(&text), format!("0551234567\n{body}"));
    }

    #[test]
    fn test_no_description() {
        assert_eq!(extract_description("tiny"), "");
    }

    #[test]
    fn test_strip_noise() {
        let text = "Apply now (adsbygoogle = window.adsbygoogle || []).push({}); today \
                    googletag.cmd.push(function() {});";
        assert_eq!(strip_noise(text).trim(), "Apply now  today");
    }

    #[test]
    fn test_restructure_is_idempotent_for_marked_headers() {
        let once = restructure("✅ Requirements: iqama");
        assert_eq!(once, "✅ Requirements:\niqama");
        assert_eq!(restructure(&once), once);
    }

    #[test]
    fn test_long_description_cut_on_line_break() {
        let paragraph = format!("{}\n", "w".repeat(99));
        let text = format!("Chat on WhatsApp\n{}", paragraph.repeat(20));
        let description = extract_description(&text);
        assert!(description.ends_with(DESCRIPTION_CONTINUES));
        assert!(description.chars().count() <= DESCRIPTION_MAX_CHARS + DESCRIPTION_CONTINUES.len());
    }
}
