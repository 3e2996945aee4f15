//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context, and `ExtractionFailure` for the per-posting
//! outcomes that the orchestrator tallies instead of propagating.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-retryable or exhausted error status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// URL does not have the posting shape (`/cls/<8 digits>.html`).
    #[error("Not a posting URL: '{0}'. Expected .../cls/NNNNNNNN.html")]
    InvalidPostingUrl(String),

    /// The anti-automation interstitial never cleared within the retry budget.
    #[error("Blocked by challenge page at {url} after {attempts} attempt(s)")]
    Blocked { url: String, attempts: u32 },

    /// A fetch (or the whole challenge-retry loop) exceeded its time budget.
    #[error("Fetching {url} timed out after {elapsed:?}")]
    FetchTimeout { url: String, elapsed: Duration },

    /// No posting links were found on any scanned listing page.
    #[error("No posting links found across {pages_scanned} listing page(s)")]
    DiscoveryEmpty { pages_scanned: u32 },

    /// Writing the CSV output failed.
    #[error("Failed to persist records to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// JSON (de)serialization of the dedup store failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing of the known-literals table failed.
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// A saved page did not yield a posting.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    /// A run finished with a run-level failure.
    #[error("Run failed: {0}")]
    RunFailed(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvesterError {
    /// Whether this error came from the challenge-retry budget running out.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. } | Self::FetchTimeout { .. })
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

/// Why a fetched posting page did not yield a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    /// The page text is an interstitial; the caller must refetch.
    #[error("page is a challenge interstitial")]
    ChallengePresent,

    /// No usable title after every title strategy; not a posting page.
    #[error("no usable title found")]
    NoTitle,

    /// The page came without the URL it was fetched from.
    #[error("page has no source URL")]
    MissingUrl,
}
