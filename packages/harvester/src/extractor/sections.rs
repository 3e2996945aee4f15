//! Requirements and benefits sections.
//!
//! A section rule is a start pattern plus a terminator pattern; the section
//! runs from the start match up to the first terminator after it. Rules are
//! tried in order and the first section whose cleaned length falls inside
//! the accepted window wins.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// A start marker and the markers that end the section.
#[derive(Debug, Clone)]
pub struct SectionRule {
    pub start: Regex,
    pub terminators: Regex,
}

impl SectionRule {
    /// Raw text of the section, including its header.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        let header = self.start.find(text)?;
        let body = &text[header.end()..];
        let skipped = body.len() - body.trim_start().len();
        let end = self
            .terminators
            .find(&body[skipped..])
            .map_or(body.len(), |m| skipped + m.start());
        Some(&text[header.start()..header.end() + end])
    }
}

/// Rules for one kind of section, with its accepted length window.
#[derive(Debug, Clone)]
pub struct SectionKind {
    pub rules: Vec<SectionRule>,
    /// Leading header stripped from the matched text.
    pub header: Regex,
    /// Accepted cleaned length in characters, exclusive at both ends.
    pub window: Range<usize>,
}

impl SectionKind {
    /// First section that survives cleaning and the length window.
    pub fn extract(&self, text: &str) -> Option<String> {
        self.rules
            .iter()
            .filter_map(|rule| rule.find(text))
            .map(|raw| normalize_bullets(&self.header.replace(raw.trim(), "")))
            .find(|cleaned| {
                let len = cleaned.chars().count();
                len > self.window.start && len < self.window.end
            })
    }
}

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-•*✅🎁]|\d+[.)])\s*").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

/// Normalize list markers (`-`, `*`, `•`, numbered items) to `• ` and drop blank lines.
///
/// # Examples
/// ```
/// use vacancy_harvester::extractor::sections::normalize_bullets;
///
/// assert_eq!(
///     normalize_bullets("- Valid iqama\n\n2. Two years   experience"),
///     "• Valid iqama\n• Two years experience"
/// );
/// ```
pub fn normalize_bullets(text: &str) -> String {
    text.lines()
        .map(|line| INLINE_SPACE.replace_all(line.trim(), " "))
        .filter(|line| !line.is_empty())
        .map(|line| {
            if BULLET.is_match(&line) {
                format!("• {}", BULLET.replace(&line, ""))
            } else {
                line.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// The blank-line terminator is case-sensitive: a paragraph starting with a capital
// ends the section, a lowercase continuation does not.
const PARAGRAPH_BREAK: &str = r"\n[ \t]*\n[ \t]*[A-Z]";

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
fn section_rule(start: &str, terminators: &str, paragraph_break: bool) -> SectionRule {
    let terminators = if paragraph_break {
        format!(r"(?i:\b(?:{terminators})\b)|{PARAGRAPH_BREAK}")
    } else {
        format!(r"(?i:\b(?:{terminators})\b)")
    };
    SectionRule {
        start: Regex::new(start).expect("valid regex"),
        terminators: Regex::new(&terminators).expect("valid regex"),
    }
}

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static REQUIREMENTS: LazyLock<SectionKind> = LazyLock::new(|| SectionKind {
    rules: vec![
        section_rule(
            r"(?i)(?:✅\s*)?Requirements:",
            "What We Offer|Benefits|For More Details|Contact|Salary|Position|Back|Next",
            true,
        ),
        section_rule(
            r"(?i)Valid And Transferable|Experience required|Must have",
            "What We Offer|Benefits|For More Details|Communication|Contact",
            false,
        ),
        section_rule(
            r"(?i)Qualifications|Minimum requirements",
            "What We Offer|Benefits|For More Details",
            false,
        ),
    ],
    header: Regex::new(r"(?i)^(?:✅\s*)?Requirements:\s*").expect("valid regex"),
    window: 30..600,
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static BENEFITS: LazyLock<SectionKind> = LazyLock::new(|| SectionKind {
    rules: vec![
        section_rule(
            r"(?i)(?:🎁\s*)?What We Offer:",
            "Requirements|For More Details|Contact|Back|Next",
            true,
        ),
        section_rule(
            r"(?i)Competitive fixed salary|Company will provide|Benefits include",
            "Requirements|For More Details|Contact",
            false,
        ),
    ],
    header: Regex::new(r"(?i)^(?:🎁\s*)?What We Offer:\s*").expect("valid regex"),
    window: 20..500,
});

/// The requirements section, if one of acceptable length is present.
pub fn extract_requirements(text: &str) -> Option<String> {
    REQUIREMENTS.extract(text)
}

/// The benefits section, if one of acceptable length is present.
pub fn extract_benefits(text: &str) -> Option<String> {
    BENEFITS.extract(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const POSTING: &str = "Hiring heavy drivers\n\
        Requirements:\n\
        - Valid and transferable iqama\n\
        - Saudi driving license\n\
        3. At least two years of experience\n\
        What We Offer:\n\
        • Free accommodation\n\
        • Transportation and medical\n\
        For More Details call 0551234567";

    #[test]
    fn test_requirements_section() {
        assert_eq!(
            extract_requirements(POSTING).unwrap(),
            "• Valid and transferable iqama\n• Saudi driving license\n• At least two years of experience"
        );
    }

    #[test]
    fn test_benefits_section() {
        assert_eq!(
            extract_benefits(POSTING).unwrap(),
            "• Free accommodation\n• Transportation and medical"
        );
    }

    #[test]
    fn test_requirements_too_short_is_rejected() {
        assert_eq!(extract_requirements("Requirements: iqama\nWhat We Offer: food"), None);
    }

    #[test]
    fn test_requirements_second_rule() {
        let text = "Must have a valid driving license and three years in the Kingdom.\nContact 0551234567";
        assert_eq!(
            extract_requirements(text).unwrap(),
            "Must have a valid driving license and three years in the Kingdom."
        );
    }

    #[test]
    fn test_terminator_is_word_bounded() {
        // "Background" must not end the section at "Back"
        let text = "Requirements:\n- Background in accounting preferred\n- Fluent English\nSalary: 3000";
        assert_eq!(
            extract_requirements(text).unwrap(),
            "• Background in accounting preferred\n• Fluent English"
        );
    }

    #[test]
    fn test_paragraph_break_terminates() {
        let text = "What We Offer:\nFree food and accommodation provided\n\nApply today with your CV";
        assert_eq!(
            extract_benefits(text).unwrap(),
            "Free food and accommodation provided"
        );
    }

    #[test]
    fn test_no_section() {
        assert_eq!(extract_benefits("Nothing to see"), None);
    }
}
