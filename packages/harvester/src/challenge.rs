//! Challenge (anti-automation interstitial) detection and the shared retry loop.
//!
//! Every fetch, listing page or posting page, goes through [`fetch_with_retry`]:
//!
//! ```text
//! Fetching -> Content                       (done)
//!          -> Challenged -> Waiting -> poll -> Content (done)
//!                                           -> Refetching -> ...
//! ```
//!
//! After `max_attempts` challenged navigations the fetch fails with
//! [`HarvesterError::Blocked`]; exceeding `total_budget` fails with
//! [`HarvesterError::FetchTimeout`].

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HarvesterError, Result};
use crate::session::{Page, PageSession};

/// Markers matched (lowercased) against the page title.
pub const TITLE_MARKERS: &[&str] = &["just a moment"];

/// Markers matched (lowercased) against the page body.
pub const BODY_MARKERS: &[&str] = &[
    "checking your browser",
    "enable javascript and cookies",
    "verify you are human",
];

/// Whether a page is an interstitial rather than content.
///
/// # Examples
/// ```
/// use vacancy_harvester::challenge::is_challenge;
///
/// assert!(is_challenge("Just a moment...", ""));
/// assert!(is_challenge("", "Please VERIFY you are human"));
/// assert!(!is_challenge("Driver needed", "Salary: 2300"));
/// ```
pub fn is_challenge(title: &str, text: &str) -> bool {
    let title = title.to_lowercase();
    if TITLE_MARKERS.iter().any(|m| title.contains(m)) {
        return true;
    }
    let text = text.to_lowercase();
    BODY_MARKERS.iter().any(|m| text.contains(m))
}

/// [`is_challenge`] applied to a fetched page.
pub fn is_challenge_page(page: &Page) -> bool {
    is_challenge(&page.title, &page.text)
}

/// Bounded retry policy for challenged fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Navigations attempted before giving up (at least 1).
    pub max_attempts: u32,
    /// Fixed wait after a challenge is seen.
    pub backoff: Duration,
    /// How long to poll for the interstitial to clear in place.
    pub poll_timeout: Duration,
    /// Upper bound on the whole loop.
    pub total_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(8),
            poll_timeout: Duration::from_secs(15),
            total_budget: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests and offline replays.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
            poll_timeout: Duration::ZERO,
            total_budget: Duration::from_secs(60),
        }
    }
}

/// Fetch `url` through `session`, riding out challenge interstitials.
///
/// Navigation errors count as an attempt and are retried too; the last error
/// is returned if every attempt failed that way.
#[tracing::instrument(skip(session, policy), fields(max_attempts = policy.max_attempts))]
pub fn fetch_with_retry(
    session: &mut dyn PageSession,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Page> {
    let started = Instant::now();
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<HarvesterError> = None;

    for attempt in 1..=attempts {
        if started.elapsed() > policy.total_budget {
            return Err(HarvesterError::FetchTimeout {
                url: url.to_string(),
                elapsed: started.elapsed(),
            });
        }

        let page = match session.navigate(url) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "navigation failed");
                last_error = Some(e);
                if attempt < attempts {
                    sleep(policy.backoff);
                }
                continue;
            }
        };

        if !is_challenge_page(&page) {
            return Ok(page);
        }
        last_error = None;

        tracing::warn!(attempt, "challenge page detected, waiting");
        sleep(policy.backoff);

        match session.wait_for_content(policy.poll_timeout) {
            Ok(page) if !is_challenge_page(&page) => {
                tracing::info!(attempt, "challenge cleared");
                return Ok(page);
            }
            Ok(_) => tracing::debug!(attempt, "still challenged after polling"),
            Err(e) => tracing::debug!(attempt, error = %e, "polling for content failed"),
        }
    }

    Err(last_error.unwrap_or_else(|| HarvesterError::Blocked {
        url: url.to_string(),
        attempts,
    }))
}

fn sleep(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
