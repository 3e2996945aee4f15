//! Ordered `(field, pattern)` rules evaluated first-match-wins per field.
//!
//! Priority inside a field follows table order: the most specific, labelled
//! patterns come first and the general ones last. Capture group 1 of every
//! pattern holds the field value.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};

/// A posting field that is filled from a rule chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Salary,
    Contact,
    Email,
    Location,
    PostingId,
    PostedDate,
    Category,
    EmploymentType,
    Company,
}

impl Field {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Salary => "salary",
            Self::Contact => "contact",
            Self::Email => "email",
            Self::Location => "location",
            Self::PostingId => "posting_id",
            Self::PostedDate => "posted_date",
            Self::Category => "category",
            Self::EmploymentType => "employment_type",
            Self::Company => "company",
        }
    }
}

/// One candidate pattern for a field.
#[derive(Debug, Clone)]
pub struct Rule {
    pub field: Field,
    pub pattern: Regex,
}

impl Rule {
    /// Compile a rule; the pattern must have at least one capture group.
    pub fn new(field: Field, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| HarvesterError::Config(format!("invalid {} rule: {e}", field.as_str())))?;
        if pattern.captures_len() < 2 {
            return Err(HarvesterError::Config(format!(
                "{} rule '{}' has no capture group",
                field.as_str(),
                pattern.as_str()
            )));
        }
        Ok(Self { field, pattern })
    }

    /// Value of the first match in `text`, trimmed.
    pub fn first(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Values of every match in `text`, in text order.
    pub fn all<'t>(&'t self, text: &'t str) -> impl Iterator<Item = String> + 't {
        self.pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Literal values looked for before any pattern runs.
///
/// Empty by default; loaded from YAML such as:
///
/// ```yaml
/// salary: ["2300"]
/// contact: ["0534204608"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownLiterals {
    #[serde(default)]
    pub salary: Vec<String>,
    #[serde(default)]
    pub contact: Vec<String>,
}

impl KnownLiterals {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.salary.is_empty() && self.contact.is_empty()
    }
}

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DEFAULT_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let table: &[(Field, &str)] = &[
        (Field::Title, r"(?im)^[ \t]*Job Title:[ \t]*([^\n\r]+)"),
        (Field::Title, r"(?im)^[ \t]*Position:[ \t]*([^\n\r]+)"),
        (Field::Title, r"(?i)Hiring For[ \t]+([^\n\r]+)"),
        (Field::Title, r"(?i)Looking for[ \t]+([^\n\r]+)"),
        (Field::Salary, r"(?i)Salary:?\s*(\d{3,5})"),
        (Field::Salary, r"(?i)salary\s+(\d{3,5})"),
        (Field::Salary, r"(?i)(\d{4})\s*(?:SR|SAR|Riyal)"),
        (Field::Salary, r"(?i)(\d{3,5})\s*SAR"),
        (Field::Contact, r"\b(05\d{8})\b"),
        (Field::Contact, r"\b(01\d{8})\b"),
        (Field::Contact, r"(\+966\d{9})"),
        (Field::Email, r"(?i)From:\s*([^\s@]+@[^\s]+\.[^\s]+)"),
        (Field::Email, r"([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})"),
        (Field::Email, r"(?i)Email:\s*([^\s@]+@[^\s]+)"),
        (Field::Location, r"(?i)Region:\s*([^\n\r()]+)"),
        (Field::Location, r"(?i)Location:\s*\[([^\]]+)\]"),
        (Field::Location, r"(?i)Location:\s*([^\n\r]+)"),
        (Field::Location, r"(?i)City:\s*([^\n\r]+)"),
        (Field::PostingId, r"(?i)Posting ID:\s*(\d+)"),
        (Field::PostedDate, r"(?i)Posted:\s*([^\n\r]+)"),
        (Field::PostedDate, r"(?i)Date:\s*([^\n\r]+)"),
        (Field::PostedDate, r"(\d{1,2}/\d{1,2}/\d{4})"),
        (Field::PostedDate, r"(\d{1,2}-\d{1,2}-\d{4})"),
        (
            Field::PostedDate,
            r"((?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2},?\s+\d{4})",
        ),
        (Field::Category, r"(?i)Category:\s*([^\n\r]+)"),
        (Field::EmploymentType, r"(?i)\b(full[- ]time)\b"),
        (Field::EmploymentType, r"(?i)\b(part[- ]time)\b"),
        (Field::EmploymentType, r"(?i)\b(contract)\b"),
        (Field::EmploymentType, r"(?i)\b(temporary)\b"),
        (Field::EmploymentType, r"(?i)\b(permanent)\b"),
        (
            Field::Company,
            r"(?im)^[ \t]*(?:company|employer|organization)[ \t]*:[ \t]*([^\n\r]+)",
        ),
    ];

    table
        .iter()
        .map(|(field, pattern)| Rule::new(*field, pattern).expect("valid regex"))
        .collect()
});

/// The complete extraction rule set: pattern rules plus known literals.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    known: KnownLiterals,
    site_host: Option<String>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
            known: KnownLiterals::default(),
            site_host: None,
        }
    }
}

impl RuleTable {
    /// Default rules with a known-literals fast path.
    #[must_use]
    pub fn with_known_literals(known: KnownLiterals) -> Self {
        Self {
            known,
            ..Self::default()
        }
    }

    /// Reject email addresses on the listing site's own domain.
    #[must_use]
    pub fn with_site_host(mut self, host: impl Into<String>) -> Self {
        self.site_host = Some(host.into().to_lowercase());
        self
    }

    /// Append a rule after the existing rules of its field.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn known_literals(&self) -> &KnownLiterals {
        &self.known
    }

    #[must_use]
    pub fn site_host(&self) -> Option<&str> {
        self.site_host.as_deref()
    }

    /// The rules for `field`, in priority order.
    pub fn rules_for(&self, field: Field) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.field == field)
    }

    /// First match of the highest-priority matching rule.
    pub fn first_match(&self, field: Field, text: &str) -> Option<String> {
        self.rules_for(field).find_map(|r| r.first(text))
    }

    /// First value per rule, in rule order; used where candidates need filtering.
    pub fn candidates<'a>(
        &'a self,
        field: Field,
        text: &'a str,
    ) -> impl Iterator<Item = String> + 'a {
        self.rules_for(field).filter_map(move |r| r.first(text))
    }

    /// Every match of every rule for `field`, rule order first, text order second.
    pub fn all_matches(&self, field: Field, text: &str) -> Vec<String> {
        self.rules_for(field).flat_map(|r| r.all(text)).collect()
    }
}
