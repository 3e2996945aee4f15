//! Field extraction from the visible text of a posting page.
//!
//! [`extract`] is a pure function of its input: it never fetches and never
//! touches storage. Every field is filled independently, so a field that is
//! missing from the page leaves all other fields unaffected.

pub mod description;
pub mod rules;
pub mod sections;
pub mod title;

use chrono::{DateTime, Utc};

use crate::challenge::is_challenge;
use crate::config::posting_id_from_url;
use crate::error::ExtractionFailure;
use crate::types::JobPosting;

pub use rules::{Field, KnownLiterals, Rule, RuleTable};

/// Company names longer than this are running text, not a name.
const COMPANY_MAX_CHARS: usize = 100;

/// Characters trimmed from the end of a matched email address.
const EMAIL_TRAILING: &[char] = &['.', ',', ';', ':', ')', ']', '>'];

/// What the extractor sees of one posting page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractInput {
    pub url: String,
    /// Document title.
    pub title: String,
    /// Full visible text.
    pub text: String,
    pub scraped_at: DateTime<Utc>,
}

impl ExtractInput {
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            text: text.into(),
            scraped_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_scraped_at(mut self, scraped_at: DateTime<Utc>) -> Self {
        self.scraped_at = scraped_at;
        self
    }
}

/// Extract a [`JobPosting`] from one page.
///
/// # Errors
///
/// [`ExtractionFailure::ChallengePresent`] when the page is an interstitial and
/// must be refetched; [`ExtractionFailure::NoTitle`] when no title strategy
/// produced a usable title; [`ExtractionFailure::MissingUrl`] when the input
/// has no URL.
pub fn extract(input: &ExtractInput, rules: &RuleTable) -> Result<JobPosting, ExtractionFailure> {
    if input.url.trim().is_empty() {
        return Err(ExtractionFailure::MissingUrl);
    }
    if is_challenge(&input.title, &input.text) {
        return Err(ExtractionFailure::ChallengePresent);
    }

    let text = input.text.as_str();
    let title =
        title::derive_title(&input.title, text, rules).ok_or(ExtractionFailure::NoTitle)?;

    let mut posting = JobPosting::new(input.url.clone(), input.scraped_at);
    posting.title = title;
    posting.salary = extract_salary(text, rules);
    posting.contact = extract_contact(text, rules);
    posting.email = extract_email(text, rules);
    posting.location = rules.first_match(Field::Location, text).unwrap_or_default();
    posting.posting_id = rules
        .first_match(Field::PostingId, text)
        .or_else(|| posting_id_from_url(&input.url))
        .unwrap_or_default();
    posting.posted_date = rules.first_match(Field::PostedDate, text).unwrap_or_default();
    posting.category = rules.first_match(Field::Category, text).unwrap_or_default();
    posting.employment_type = rules
        .first_match(Field::EmploymentType, text)
        .map(|t| t.to_lowercase().replace(' ', "-"))
        .unwrap_or_default();
    posting.company = rules
        .candidates(Field::Company, text)
        .find(|c| c.chars().count() < COMPANY_MAX_CHARS)
        .unwrap_or_default();
    posting.requirements = sections::extract_requirements(text).unwrap_or_default();
    posting.benefits = sections::extract_benefits(text).unwrap_or_default();
    posting.description = description::extract_description(text);

    Ok(posting.bounded())
}

/// Known literal first, then the salary rules.
fn extract_salary(text: &str, rules: &RuleTable) -> String {
    rules
        .known_literals()
        .salary
        .iter()
        .find(|literal| text.contains(literal.as_str()))
        .cloned()
        .or_else(|| rules.first_match(Field::Salary, text))
        .unwrap_or_default()
}

/// Every distinct phone number, known literals first, joined with `, `.
fn extract_contact(text: &str, rules: &RuleTable) -> String {
    let known = rules
        .known_literals()
        .contact
        .iter()
        .filter(|literal| text.contains(literal.as_str()))
        .cloned();

    let mut seen = Vec::new();
    for number in known.chain(rules.all_matches(Field::Contact, text)) {
        if !seen.contains(&number) {
            seen.push(number);
        }
    }
    seen.join(", ")
}

/// First address, in rule priority order, not on the listing site's own domain.
fn extract_email(text: &str, rules: &RuleTable) -> String {
    let site = rules.site_host();
    rules
        .all_matches(Field::Email, text)
        .into_iter()
        .map(|e| e.trim_end_matches(EMAIL_TRAILING).to_string())
        .find(|e| e.contains('@') && site.is_none_or(|host| !on_host(e, host)))
        .unwrap_or_default()
}

/// Whether the address's domain is `host` or one of its subdomains.
fn on_host(email: &str, host: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    let domain = domain.to_lowercase();
    domain == host
        || domain
            .strip_suffix(host)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://www.expatriates.com/cls/60196199.html";

    const PAGE: &str = "Riyadh Jobs\n\
        Posting ID: 60196199\n\
        Posted: Mon, Jun 16, 2025\n\
        Category: Drivers\n\
        Region: Riyadh (Central Province)\n\
        From: hr.team@logistics.example\n\
        Chat on WhatsApp\n\
        We are hiring full-time heavy drivers for our Riyadh branch. \
        Salary: 2300 SAR plus overtime. Call 0551234567 or +966551234567.\n\
        Requirements:\n\
        - Valid and transferable iqama\n\
        - Saudi heavy driving license\n\
        What We Offer:\n\
        - Free accommodation and transportation\n\
        For More Details call 0551234567\n\
        Back\n\
        Email to a Friend";

    fn input(title: &str, text: &str) -> ExtractInput {
        ExtractInput::new(URL, title, text)
            .with_scraped_at(Utc.with_ymd_and_hms(2025, 6, 16, 12, 0, 0).unwrap())
    }

    fn table() -> RuleTable {
        RuleTable::default().with_site_host("expatriates.com")
    }

    #[test]
    fn test_extract_full_posting() {
        let title = "Riyadh Jobs, Heavy Driver, 60196199 - expatriates.com";
        let posting = extract(&input(title, PAGE), &table()).unwrap();

        assert_eq!(posting.url, URL);
        assert_eq!(posting.title, "Heavy Driver");
        assert_eq!(posting.posting_id, "60196199");
        assert_eq!(posting.posted_date, "Mon, Jun 16, 2025");
        assert_eq!(posting.category, "Drivers");
        assert_eq!(posting.location, "Riyadh");
        assert_eq!(posting.email, "hr.team@logistics.example");
        assert_eq!(posting.salary, "2300");
        assert_eq!(posting.contact, "0551234567, +966551234567");
        assert_eq!(posting.employment_type, "full-time");
        assert_eq!(
            posting.requirements,
            "• Valid and transferable iqama\n• Saudi heavy driving license"
        );
        assert_eq!(posting.benefits, "• Free accommodation and transportation");
        assert!(posting.description.starts_with("We are hiring full-time heavy drivers"));
        assert!(posting.description.contains("✅ Requirements:"));
        assert!(!posting.description.contains("Email to a Friend"));
        assert!(!posting.is_sponsored);
    }

    #[test]
    fn test_challenge_page_fails() {
        let err = extract(&input("Driver", "Please verify you are human"), &table()).unwrap_err();
        assert_eq!(err, ExtractionFailure::ChallengePresent);

        let err = extract(&input("Just a moment...", PAGE), &table()).unwrap_err();
        assert_eq!(err, ExtractionFailure::ChallengePresent);
    }

    #[test]
    fn test_no_title_fails() {
        let err = extract(&input("", "ok\nno"), &table()).unwrap_err();
        assert_eq!(err, ExtractionFailure::NoTitle);
    }

    #[test]
    fn test_missing_email_leaves_other_fields() {
        let without_email = PAGE.replace("From: hr.team@logistics.example\n", "");
        let full = extract(&input("Heavy Driver", PAGE), &table()).unwrap();
        let partial = extract(&input("Heavy Driver", &without_email), &table()).unwrap();

        assert_eq!(partial.email, "");
        assert_eq!(partial.salary, full.salary);
        assert_eq!(partial.contact, full.contact);
        assert_eq!(partial.location, full.location);
        assert_eq!(partial.posting_id, full.posting_id);
        assert_eq!(partial.requirements, full.requirements);
    }

    #[test]
    fn test_site_email_is_rejected() {
        let text = "Contact support@expatriates.com or jobs@acme.example";
        let posting = extract(&input("Welder", text), &table()).unwrap();
        assert_eq!(posting.email, "jobs@acme.example");

        let text = "Write to hr@mail.expatriates.com or hr@notexpatriates.com";
        let posting = extract(&input("Welder", text), &table()).unwrap();
        assert_eq!(posting.email, "hr@notexpatriates.com");
    }

    #[test]
    fn test_missing_url_fails() {
        let no_url = ExtractInput::new("", "Heavy Driver", PAGE);
        let err = extract(&no_url, &table()).unwrap_err();
        assert_eq!(err, ExtractionFailure::MissingUrl);
    }

    #[test]
    fn test_posting_id_falls_back_to_url() {
        let posting = extract(&input("Welder", "Welders needed"), &table()).unwrap();
        assert_eq!(posting.posting_id, "60196199");
    }

    #[test]
    fn test_known_literals_take_priority() {
        let known = KnownLiterals {
            salary: vec!["1999".to_string()],
            contact: vec!["0534204608".to_string()],
        };
        let rules = RuleTable::with_known_literals(known);
        let text = "Salary: 2300, bonus 1999. Call 0551234567 or 0534204608";
        let posting = extract(&input("Welder", text), &rules).unwrap();

        assert_eq!(posting.salary, "1999");
        assert_eq!(posting.contact, "0534204608, 0551234567");
    }

    #[test]
    fn test_company_labelled_line() {
        let text = "Company: Al Noor Trading\ncompany will provide visa";
        let posting = extract(&input("Welder", text), &table()).unwrap();
        assert_eq!(posting.company, "Al Noor Trading");
    }
}
