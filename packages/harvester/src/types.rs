//! Core data types for the harvester.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::truncate_with_marker;

/// Upper bound for any single free-text field of a [`JobPosting`].
pub const MAX_FIELD_CHARS: usize = 2000;

/// One scraped job posting.
///
/// Every text field uses the empty string for "not found".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Site-assigned identifier (empty when neither page nor URL carries one).
    pub posting_id: String,

    /// Canonical posting URL, never empty.
    pub url: String,

    pub title: String,
    pub location: String,
    pub salary: String,
    pub contact: String,
    pub email: String,
    pub company: String,
    pub category: String,
    pub employment_type: String,
    pub posted_date: String,
    pub requirements: String,
    pub benefits: String,
    pub description: String,

    pub is_sponsored: bool,
    pub scraped_at: DateTime<Utc>,
}

impl JobPosting {
    /// Create an empty posting for a URL.
    #[must_use]
    pub fn new(url: impl Into<String>, scraped_at: DateTime<Utc>) -> Self {
        Self {
            posting_id: String::new(),
            url: url.into(),
            title: String::new(),
            location: String::new(),
            salary: String::new(),
            contact: String::new(),
            email: String::new(),
            company: String::new(),
            category: String::new(),
            employment_type: String::new(),
            posted_date: String::new(),
            requirements: String::new(),
            benefits: String::new(),
            description: String::new(),
            is_sponsored: false,
            scraped_at,
        }
    }

    /// Posting identifier, if known.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        Some(self.posting_id.as_str()).filter(|id| !id.is_empty())
    }

    /// Apply the global per-field length bound.
    #[must_use]
    pub fn bounded(mut self) -> Self {
        for field in [
            &mut self.title,
            &mut self.location,
            &mut self.salary,
            &mut self.contact,
            &mut self.email,
            &mut self.company,
            &mut self.category,
            &mut self.employment_type,
            &mut self.posted_date,
            &mut self.requirements,
            &mut self.benefits,
            &mut self.description,
        ] {
            if field.chars().count() > MAX_FIELD_CHARS {
                *field =
                    truncate_with_marker(field, MAX_FIELD_CHARS, crate::text::CONTINUATION_MARKER);
            }
        }
        self
    }
}

/// Classification of a discovered posting link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkClass {
    /// Context text ends with the literal "Sponsored" marker.
    Sponsored,
    /// Context text carries a post-date signal.
    Regular,
    /// Neither signal matched.
    Unknown,
}

impl LinkClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sponsored => "sponsored",
            Self::Regular => "regular",
            Self::Unknown => "unknown",
        }
    }
}

/// What discovery does with links that are neither sponsored nor dated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownLinkPolicy {
    /// Keep them and treat them like regular postings.
    #[default]
    AsRegular,
    /// Drop them.
    Exclude,
    /// Keep them, marked [`LinkClass::Unknown`].
    Flag,
}

/// A posting link found on a listing page, before extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingLink {
    /// Absolute posting URL (always posting-shaped).
    pub url: String,
    pub class: LinkClass,
    pub has_date_signal: bool,
    /// Text of the enclosing listing entry; only used for classification.
    #[serde(skip)]
    pub raw_context_text: String,
}

impl ListingLink {
    #[must_use]
    pub fn is_sponsored(&self) -> bool {
        self.class == LinkClass::Sponsored
    }
}

/// Limits for one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestOptions {
    /// Maximum number of new postings fetched (`None` = all).
    pub max_jobs: Option<usize>,
    pub max_pages: u32,
    pub include_sponsored: bool,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            max_jobs: None,
            max_pages: crate::config::DEFAULT_MAX_PAGES,
            include_sponsored: false,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// How many extracted records carry each commonly missing field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCoverage {
    pub with_salary: usize,
    pub with_contact: usize,
    pub with_email: usize,
    pub with_location: usize,
    pub with_posted_date: usize,
    pub with_description: usize,
}

impl FieldCoverage {
    /// Count field presence over a set of records.
    #[must_use]
    pub fn of(records: &[JobPosting]) -> Self {
        let count =
            |f: fn(&JobPosting) -> &str| records.iter().filter(|r| !f(r).is_empty()).count();
        Self {
            with_salary: count(|r| r.salary.as_str()),
            with_contact: count(|r| r.contact.as_str()),
            with_email: count(|r| r.email.as_str()),
            with_location: count(|r| r.location.as_str()),
            with_posted_date: count(|r| r.posted_date.as_str()),
            with_description: count(|r| r.description.as_str()),
        }
    }
}

/// Summary of one end-to-end run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub pages_scanned: u32,
    pub urls_discovered: usize,
    pub sponsored_seen: usize,
    pub new_jobs: usize,
    pub skipped_already_seen: usize,
    pub failed_extractions: usize,
    /// Subset of `failed_extractions` that never got past the challenge page.
    pub blocked: usize,
    pub written: usize,
    pub skipped_duplicate: usize,
    pub coverage: FieldCoverage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeRun {
    /// Start a new run record.
    #[must_use]
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            status: RunStatus::Success,
            pages_scanned: 0,
            urls_discovered: 0,
            sponsored_seen: 0,
            new_jobs: 0,
            skipped_already_seen: 0,
            failed_extractions: 0,
            blocked: 0,
            written: 0,
            skipped_duplicate: 0,
            coverage: FieldCoverage::default(),
            error: None,
        }
    }

    /// Finalize as successful.
    pub fn succeed(&mut self, finished_at: DateTime<Utc>) {
        self.status = RunStatus::Success;
        self.finished_at = Some(finished_at);
    }

    /// Finalize as failed with a run-level error.
    pub fn fail(&mut self, finished_at: DateTime<Utc>, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(finished_at);
    }

    /// Wall-clock duration in milliseconds, once finalized.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
