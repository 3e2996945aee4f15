//! URL discovery over the paginated listing and link classification.
//!
//! A posting anchor is classified by the text of its enclosing listing entry:
//! a trailing `Sponsored` marker wins over any date signal, a timestamp or
//! relative date makes it regular, and anything else is unknown.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::challenge::{fetch_with_retry, RetryPolicy};
use crate::config::{is_posting_url, HarvestConfig};
use crate::error::{HarvesterError, Result};
use crate::session::PageSession;
use crate::types::{HarvestOptions, LinkClass, ListingLink, UnknownLinkPolicy};

/// Literal marker at the end of a sponsored entry.
pub const SPONSORED_MARKER: &str = "Sponsored";

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Full listing timestamp, e.g. `Mon, Jun 16, 2025, 9:15:02 AM - 2 hours ago`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\w{3}, \w{3} \d{1,2}, \d{4}, \d{1,2}:\d{2}:\d{2} [AP]M - (?:\d+ \w+ ago|an hour ago|a day ago)$",
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DATE_SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d{1,2}/\d{1,2}/\d{4}",
        r"\d{1,2}-\d{1,2}-\d{4}",
        r"(?i)\b\d+ (?:minutes?|hours?|days?|weeks?) ago\b",
        r"(?i)\ban? (?:minute|hour|day|week) ago\b",
        r"(?i)\b(?:today|yesterday)\b",
        r"\w+ \d{1,2}, \d{4}",
        r"\b\d{1,2}:\d{2}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static INDEX_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/index(\d+)\.html$").expect("valid regex"));

/// Whether an entry's text carries any post-date signal.
pub fn has_date_signal(context: &str) -> bool {
    let context = context.trim();
    TIMESTAMP.is_match(context) || DATE_SIGNALS.iter().any(|re| re.is_match(context))
}

/// Classify a listing entry by its text. The sponsored check runs first.
///
/// # Examples
/// ```
/// use vacancy_harvester::discovery::classify_context;
/// use vacancy_harvester::types::LinkClass;
///
/// assert_eq!(classify_context("Cook wanted Sponsored"), LinkClass::Sponsored);
/// assert_eq!(classify_context("Cook wanted 3 hours ago"), LinkClass::Regular);
/// assert_eq!(classify_context("Cook wanted"), LinkClass::Unknown);
/// ```
pub fn classify_context(context: &str) -> LinkClass {
    let context = context.trim();
    if context.ends_with(SPONSORED_MARKER) {
        LinkClass::Sponsored
    } else if has_date_signal(context) {
        LinkClass::Regular
    } else {
        LinkClass::Unknown
    }
}

/// Posting links and the pagination signal of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Posting links in page order, unique by URL.
    pub links: Vec<ListingLink>,
    /// The page links onwards to a further listing page.
    pub has_next: bool,
}

fn index_offset(url: &Url) -> Option<u32> {
    INDEX_PAGE
        .captures(url.path())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical posting URL: absolute, without query or fragment.
fn canonical_posting_url(base: &Url, href: &str) -> Option<String> {
    let mut url = base.join(href.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    let url = url.to_string();
    is_posting_url(&url).then_some(url)
}

/// Parse one listing page.
///
/// Relative hrefs are resolved against `page_url`; anchors that do not have
/// the posting shape are never returned.
pub fn parse_listing_page(html: &str, page_url: &str) -> Result<ListingPage> {
    let base = Url::parse(page_url)?;
    let current_offset = index_offset(&base).unwrap_or(0);
    let document = Html::parse_document(html);

    let mut page = ListingPage::default();
    let mut seen = HashSet::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let label = anchor.text().collect::<String>();
        if label.trim().to_lowercase().starts_with("next") {
            page.has_next = true;
        }

        if let Ok(target) = base.join(href.trim()) {
            if index_offset(&target).is_some_and(|offset| offset > current_offset) {
                page.has_next = true;
            }
        }

        let Some(url) = canonical_posting_url(&base, href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let context = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .map(|parent| parent.text().collect::<String>())
            .unwrap_or(label);
        let context = context.trim().to_string();

        page.links.push(ListingLink {
            url,
            class: classify_context(&context),
            has_date_signal: has_date_signal(&context),
            raw_context_text: context,
        });
    }

    Ok(page)
}

/// Limits and policies of one discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub max_pages: u32,
    pub include_sponsored: bool,
    pub unknown_links: UnknownLinkPolicy,
    /// Consecutive pages without posting links before stopping.
    pub max_empty_pages: u32,
    /// Pause between two listing fetches.
    pub request_delay: Duration,
}

impl DiscoveryOptions {
    #[must_use]
    pub fn new(config: &HarvestConfig, options: &HarvestOptions) -> Self {
        Self {
            max_pages: options.max_pages,
            include_sponsored: options.include_sponsored,
            unknown_links: config.unknown_links,
            max_empty_pages: config.max_empty_pages.max(1),
            request_delay: config.request_delay,
        }
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::new(&HarvestConfig::default(), &HarvestOptions::default())
    }
}

/// Result of a discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Links to process, in page order.
    pub links: Vec<ListingLink>,
    pub pages_scanned: u32,
    /// Unique links per classification, before filtering.
    pub regular: usize,
    pub sponsored: usize,
    pub unknown: usize,
    /// Listing pages that could not be fetched.
    pub page_errors: usize,
}

impl Discovery {
    /// Unique posting URLs seen, whether or not they were kept.
    #[must_use]
    pub fn total_seen(&self) -> usize {
        self.regular + self.sponsored + self.unknown
    }
}

/// Walks the listing pages of one site.
#[derive(Debug, Clone)]
pub struct Discoverer {
    base_url: String,
    listing_path: String,
    retry: RetryPolicy,
}

impl Discoverer {
    #[must_use]
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            listing_path: config.listing_path.clone(),
            retry: config.retry,
        }
    }

    fn page_url(&self, page: u32) -> String {
        crate::config::listing_page_url(&self.base_url, &self.listing_path, page)
    }

    /// Discover posting links, one listing page at a time.
    ///
    /// Stops at `max_pages`, after `max_empty_pages` consecutive pages without
    /// posting links, or on a page without a pagination signal. A listing page
    /// that cannot be fetched counts as empty.
    ///
    /// # Errors
    ///
    /// [`HarvesterError::DiscoveryEmpty`] when no posting link was found at all.
    #[tracing::instrument(skip_all, fields(max_pages = options.max_pages))]
    pub fn discover(
        &self,
        session: &mut dyn PageSession,
        options: &DiscoveryOptions,
    ) -> Result<Discovery> {
        let mut discovery = Discovery::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut consecutive_empty = 0;

        for page_number in 1..=options.max_pages {
            if page_number > 1 && !options.request_delay.is_zero() {
                thread::sleep(options.request_delay);
            }

            let url = self.page_url(page_number);
            discovery.pages_scanned = page_number;

            let listing = match fetch_with_retry(session, &url, &self.retry)
                .and_then(|page| parse_listing_page(&page.html, &url))
            {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::warn!(
                        page = page_number,
                        url = %url,
                        error = %e,
                        "listing page failed"
                    );
                    discovery.page_errors += 1;
                    consecutive_empty += 1;
                    if consecutive_empty >= options.max_empty_pages {
                        break;
                    }
                    continue;
                }
            };

            if listing.links.is_empty() {
                consecutive_empty += 1;
                tracing::warn!(
                    page = page_number,
                    consecutive_empty,
                    "no posting links on listing page"
                );
                if consecutive_empty >= options.max_empty_pages {
                    break;
                }
            } else {
                consecutive_empty = 0;
            }

            let mut kept = 0;
            for link in listing.links {
                if !seen.insert(link.url.clone()) {
                    continue;
                }
                if let Some(link) = self.admit(link, options, &mut discovery) {
                    discovery.links.push(link);
                    kept += 1;
                }
            }

            tracing::info!(
                page = page_number,
                kept,
                total = discovery.links.len(),
                sponsored = discovery.sponsored,
                "scanned listing page"
            );

            if !listing.has_next {
                tracing::debug!(page = page_number, "no pagination signal, stopping");
                break;
            }
        }

        if discovery.total_seen() == 0 {
            return Err(HarvesterError::DiscoveryEmpty {
                pages_scanned: discovery.pages_scanned,
            });
        }

        tracing::info!(
            links = discovery.links.len(),
            regular = discovery.regular,
            sponsored = discovery.sponsored,
            unknown = discovery.unknown,
            pages = discovery.pages_scanned,
            "discovery complete"
        );
        Ok(discovery)
    }

    /// Count a new link and apply the sponsored and unknown policies.
    fn admit(
        &self,
        mut link: ListingLink,
        options: &DiscoveryOptions,
        discovery: &mut Discovery,
    ) -> Option<ListingLink> {
        match link.class {
            LinkClass::Sponsored => {
                discovery.sponsored += 1;
                options.include_sponsored.then_some(link)
            }
            LinkClass::Regular => {
                discovery.regular += 1;
                Some(link)
            }
            LinkClass::Unknown => {
                discovery.unknown += 1;
                match options.unknown_links {
                    UnknownLinkPolicy::AsRegular => {
                        link.class = LinkClass::Regular;
                        Some(link)
                    }
                    UnknownLinkPolicy::Flag => Some(link),
                    UnknownLinkPolicy::Exclude => None,
                }
            }
        }
    }
}
