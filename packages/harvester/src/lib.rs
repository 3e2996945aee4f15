//! Vacancy Harvester - Collect job postings from a paginated classifieds site.
//!
//! A run discovers posting links on the listing pages, skips postings already
//! recorded in the dedup store, fetches and extracts the remaining ones and
//! appends them to a CSV file keyed on the posting id.
//!
//! # Example
//!
//! ```
//! use vacancy_harvester::config;
//!
//! assert!(config::is_posting_url("https://www.expatriates.com/cls/60196199.html"));
//! assert_eq!(
//!     config::posting_id_from_url("https://www.expatriates.com/cls/60196199.html").as_deref(),
//!     Some("60196199")
//! );
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration, defaults and URL patterns
//! - [`types`]: Core data types (JobPosting, ListingLink, ScrapeRun, etc.)
//! - [`error`]: Error types and Result alias
//! - [`session`]: Page sessions and the HTTP implementation
//! - [`challenge`]: Bot-challenge detection and bounded retry
//! - [`discovery`]: Listing page scanning and link classification
//! - [`extractor`]: Field extraction from posting text
//! - [`dedup`]: Durable store of harvested posting ids
//! - [`csv_sink`]: Append-only CSV persistence
//! - [`text`]: Text normalization helpers
//! - [`harvest`]: The run orchestrator
//! - [`cli`]: Command-line interface

pub mod challenge;
pub mod cli;
pub mod config;
pub mod csv_sink;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod harvest;
pub mod session;
pub mod text;
pub mod types;

// Re-export commonly used items
pub use config::HarvestConfig;
pub use error::{ExtractionFailure, HarvesterError, Result};
pub use harvest::{HarvestOutcome, Harvester};
pub use session::{HttpSession, Page, PageSession};
pub use types::{HarvestOptions, JobPosting, LinkClass, ListingLink, RunStatus, ScrapeRun};
