//! Title derivation: page-title cleanup, then labelled content, then the
//! first plausible content line.

use std::sync::LazyLock;

use regex::Regex;

use super::rules::{Field, RuleTable};
use crate::text::collapse_whitespace;

/// Titles shorter than this are treated as missing.
pub const MIN_TITLE_CHARS: usize = 3;

/// Bounds (exclusive) for the first-content-line heuristic.
const LINE_TITLE_MIN: usize = 5;
const LINE_TITLE_MAX: usize = 100;

/// Labelled titles longer than this are running text, not a title.
const LABELLED_TITLE_MAX: usize = 150;

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SITE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+-\s+(?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b.*$")
        .expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PIPE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\|.*$").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static REGION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*?Jobs,\s*").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\d+$").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BARE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}$").expect("valid regex")
});

/// Clean a document title of site decoration.
///
/// # Examples
/// ```
/// use vacancy_harvester::extractor::title::clean_page_title;
///
/// assert_eq!(
///     clean_page_title("Riyadh Jobs, Heavy Driver Needed, 60196199 - expatriates.com"),
///     "Heavy Driver Needed"
/// );
/// ```
pub fn clean_page_title(title: &str) -> String {
    let title = SITE_SUFFIX.replace(title.trim(), "");
    let title = PIPE_SUFFIX.replace(&title, "");
    let title = REGION_PREFIX.replace(&title, "");
    let title = TRAILING_NUMBER.replace(title.trim(), "");
    collapse_whitespace(&title)
}

fn usable(title: &str) -> bool {
    title.chars().count() >= MIN_TITLE_CHARS && !BARE_DOMAIN.is_match(title)
}

/// Derive a posting title, or `None` if every strategy fails.
pub fn derive_title(page_title: &str, text: &str, rules: &RuleTable) -> Option<String> {
    let cleaned = clean_page_title(page_title);
    if usable(&cleaned) {
        return Some(cleaned);
    }

    if let Some(labelled) = rules
        .candidates(Field::Title, text)
        .find(|t| usable(t) && t.chars().count() <= LABELLED_TITLE_MAX)
    {
        return Some(labelled);
    }

    text.lines()
        .map(str::trim)
        .find(|line| {
            let len = line.chars().count();
            len > LINE_TITLE_MIN && len < LINE_TITLE_MAX && !BARE_DOMAIN.is_match(line)
        })
        .map(str::to_string)
}
