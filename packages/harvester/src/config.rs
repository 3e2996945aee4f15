//! Configuration constants, environment configuration and URL helpers.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::challenge::RetryPolicy;
use crate::error::{HarvesterError, Result};
use crate::types::{HarvestOptions, UnknownLinkPolicy};

/// Default site root of the listing website.
pub const DEFAULT_BASE_URL: &str = "https://www.expatriates.com";

/// Default path of the first listing page.
pub const DEFAULT_LISTING_PATH: &str = "/classifieds/saudi-arabia/jobs/";

/// Listing pages after the first are addressed by an index offset of
/// `(page - 1) * LISTING_PAGE_STRIDE`.
pub const LISTING_PAGE_STRIDE: u32 = 100;

/// HTTP timeout per fetch in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default number of listing pages scanned in a full run.
pub const DEFAULT_MAX_PAGES: u32 = 15;

/// Default politeness delay between two fetches in one run.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 2000;

/// Default dedup retention window in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Default CSV output file.
pub const DEFAULT_OUTPUT_CSV: &str = "exports/jobs.csv";

/// Default dedup store file.
pub const DEFAULT_DEDUP_DB: &str = "exports/scraped_jobs_db.json";

/// Posting URL shape: `/cls/` followed by an 8-digit identifier and `.html`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static POSTING_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/cls/(\d{8})\.html(?:[?#].*)?$").expect("valid regex")
});

/// Check whether a URL has the posting shape.
///
/// # Examples
/// ```
/// use vacancy_harvester::config::is_posting_url;
///
/// assert!(is_posting_url("https://www.expatriates.com/cls/60196199.html"));
/// assert!(!is_posting_url("https://www.expatriates.com/cls/601961.html"));
/// assert!(!is_posting_url("https://www.expatriates.com/classifieds/saudi-arabia/jobs/"));
/// ```
pub fn is_posting_url(url: &str) -> bool {
    POSTING_URL_PATTERN.is_match(url)
}

/// Extract the numeric posting identifier from a posting URL.
///
/// # Examples
/// ```
/// use vacancy_harvester::config::posting_id_from_url;
///
/// assert_eq!(
///     posting_id_from_url("https://www.expatriates.com/cls/60196199.html"),
///     Some("60196199".to_string())
/// );
/// assert_eq!(posting_id_from_url("https://www.expatriates.com/about.html"), None);
/// ```
pub fn posting_id_from_url(url: &str) -> Option<String> {
    POSTING_URL_PATTERN
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Build the URL of a listing page.
///
/// Page 1 is the bare listing path; page N > 1 appends `index<(N-1)*100>.html`.
pub fn listing_page_url(base_url: &str, listing_path: &str, page: u32) -> String {
    let base = base_url.trim_end_matches('/');
    let path = if listing_path.ends_with('/') {
        listing_path.to_string()
    } else {
        format!("{listing_path}/")
    };

    if page <= 1 {
        format!("{base}{path}")
    } else {
        let index = (page - 1) * LISTING_PAGE_STRIDE;
        format!("{base}{path}index{index}.html")
    }
}

/// Runtime configuration of the harvester.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_url: String,
    pub listing_path: String,
    pub output_csv: PathBuf,
    pub dedup_db: PathBuf,
    pub max_pages: u32,
    pub max_jobs: Option<usize>,
    pub include_sponsored: bool,
    pub unknown_links: UnknownLinkPolicy,
    /// Mandatory pause between two fetches of one run.
    pub request_delay: Duration,
    /// Extra wait after each navigation before the page is read.
    pub page_settle: Duration,
    /// Consecutive listing pages without posting links before discovery stops.
    pub max_empty_pages: u32,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub known_literals: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            listing_path: DEFAULT_LISTING_PATH.to_string(),
            output_csv: PathBuf::from(DEFAULT_OUTPUT_CSV),
            dedup_db: PathBuf::from(DEFAULT_DEDUP_DB),
            max_pages: DEFAULT_MAX_PAGES,
            max_jobs: None,
            include_sponsored: false,
            unknown_links: UnknownLinkPolicy::default(),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            page_settle: Duration::ZERO,
            max_empty_pages: 1,
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            known_literals: None,
        }
    }
}

impl HarvestConfig {
    /// Load configuration from `VACANCY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let parse_u32 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u32>().ok());
        let parse_bool = |key: &str| lookup(key).map(|v| v != "false" && v != "0");

        let unknown_links = match lookup("VACANCY_UNKNOWN_LINKS") {
            Some(value) => value.parse()?,
            None => defaults.unknown_links,
        };

        let retry = RetryPolicy {
            max_attempts: parse_u32("VACANCY_CHALLENGE_ATTEMPTS")
                .map(|v| v.max(1))
                .unwrap_or(defaults.retry.max_attempts),
            backoff: parse_u64("VACANCY_CHALLENGE_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.backoff),
            poll_timeout: parse_u64("VACANCY_CHALLENGE_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.poll_timeout),
            total_budget: parse_u64("VACANCY_CHALLENGE_BUDGET_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.total_budget),
        };

        Ok(Self {
            base_url: lookup("VACANCY_BASE_URL").unwrap_or(defaults.base_url),
            listing_path: lookup("VACANCY_LISTING_PATH").unwrap_or(defaults.listing_path),
            output_csv: lookup("VACANCY_OUTPUT_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_csv),
            dedup_db: lookup("VACANCY_DEDUP_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.dedup_db),
            max_pages: parse_u32("VACANCY_MAX_PAGES").unwrap_or(defaults.max_pages),
            max_jobs: lookup("VACANCY_MAX_JOBS")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .or(defaults.max_jobs),
            include_sponsored: parse_bool("VACANCY_INCLUDE_SPONSORED")
                .unwrap_or(defaults.include_sponsored),
            unknown_links,
            request_delay: parse_u64("VACANCY_REQUEST_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            page_settle: parse_u64("VACANCY_PAGE_SETTLE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_settle),
            max_empty_pages: parse_u32("VACANCY_MAX_EMPTY_PAGES")
                .map(|v| v.max(1))
                .unwrap_or(defaults.max_empty_pages),
            retry,
            fetch_timeout: parse_u64("VACANCY_FETCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            known_literals: lookup("VACANCY_KNOWN_LITERALS").map(PathBuf::from),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_output_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_csv = path.into();
        self
    }

    pub fn with_dedup_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.dedup_db = path.into();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// URL of the given listing page under this configuration.
    pub fn listing_page_url(&self, page: u32) -> String {
        listing_page_url(&self.base_url, &self.listing_path, page)
    }

    /// Run options derived from the configured limits.
    pub fn harvest_options(&self) -> HarvestOptions {
        HarvestOptions {
            max_jobs: self.max_jobs,
            max_pages: self.max_pages,
            include_sponsored: self.include_sponsored,
        }
    }

    /// Host of the listing site, used to reject the site's own email addresses.
    pub fn site_host(&self) -> Option<String> {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }
}

impl std::str::FromStr for UnknownLinkPolicy {
    type Err = HarvesterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "regular" | "include" => Ok(Self::AsRegular),
            "exclude" | "drop" => Ok(Self::Exclude),
            "flag" => Ok(Self::Flag),
            other => Err(HarvesterError::Config(format!(
                "VACANCY_UNKNOWN_LINKS must be one of regular, exclude, flag (got '{other}')"
            ))),
        }
    }
}
