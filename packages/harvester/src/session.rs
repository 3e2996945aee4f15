//! Page sessions: the navigation capability the pipeline fetches through.
//!
//! The harvester only needs `navigate(url)` returning the visible text and the
//! HTML of a page. A headless browser can provide that behind [`PageSession`];
//! [`HttpSession`] is the built-in implementation on a blocking HTTP client.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{HarvesterError, Result};

/// Browser-like user agent; the listing site serves interstitials to obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Maximum number of attempts for transient network failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// One rendered page as seen by the harvester.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    /// URL the page was requested from.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Visible text content of the body.
    pub text: String,
    /// Raw HTML.
    pub html: String,
}

impl Page {
    /// Build a page from raw HTML, deriving title and body text.
    #[must_use]
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        let html = html.into();
        let (title, text) = title_and_text(&html);
        Self {
            url: url.into(),
            title,
            text,
            html,
        }
    }
}

/// Derive `(title, body text)` from an HTML document.
///
/// The body text concatenates all text nodes like the DOM `textContent`.
pub fn title_and_text(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let text = match document.select(&BODY_SELECTOR).next() {
        Some(body) => body.text().collect::<String>(),
        None => document.root_element().text().collect::<String>(),
    };

    (title, text)
}

/// A scoped navigation session.
///
/// All fetches of one run go through one session, sequentially.
pub trait PageSession {
    /// Navigate to `url` and return the loaded page.
    fn navigate(&mut self, url: &str) -> Result<Page>;

    /// Wait up to `timeout` for the current page to replace an interstitial,
    /// returning whatever the page shows afterwards.
    fn wait_for_content(&mut self, timeout: Duration) -> Result<Page>;
}

/// [`PageSession`] over a blocking HTTP client.
///
/// Without a script engine an interstitial can never clear in place, so
/// `wait_for_content` re-requests the last URL.
pub struct HttpSession {
    client: Client,
    last_url: Option<String>,
    settle: Duration,
}

impl HttpSession {
    /// Create a session with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
    }

    /// Create a session with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client(timeout)?,
            last_url: None,
            settle: Duration::ZERO,
        })
    }

    /// Pause after each navigation before the page is read.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl PageSession for HttpSession {
    fn navigate(&mut self, url: &str) -> Result<Page> {
        self.last_url = Some(url.to_string());
        let html = download_html(&self.client, url)?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(Page::from_html(url, html))
    }

    fn wait_for_content(&mut self, timeout: Duration) -> Result<Page> {
        let url = self
            .last_url
            .clone()
            .ok_or_else(|| HarvesterError::Config("wait_for_content before navigate".into()))?;
        tracing::debug!(url = %url, timeout = ?timeout, "re-requesting page while challenged");
        let html = download_html(&self.client, &url)?;
        Ok(Page::from_html(url, html))
    }
}

/// Create a configured HTTP client.
pub fn create_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Download a page body as text, retrying transient failures.
///
/// Uses exponential backoff for network errors and 5xx responses. Challenge
/// pages are usually served with 403/503; their bodies are returned as-is so
/// the challenge detector can classify them.
pub fn download_html(client: &Client, url: &str) -> Result<String> {
    let mut last_error: Option<HarvesterError> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1000ms
            let delay = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tracing::debug!(attempt, delay_ms = delay, "Retrying after delay");
            thread::sleep(Duration::from_millis(delay));
        }

        match client.get(url).send() {
            Ok(response) => {
                let status = response.status();

                if status.is_server_error() && status.as_u16() != 503 {
                    tracing::warn!(
                        status = %status,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Server error, will retry"
                    );
                    last_error = Some(HarvesterError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                    continue;
                }

                // 403/503 may carry an interstitial body; anything else 4xx is final
                if status.is_client_error() && status.as_u16() != 403 {
                    return Err(HarvesterError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }

                return Ok(response.text()?);
            }
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Connection error, will retry"
                    );
                    last_error = Some(HarvesterError::Http(e));
                    continue;
                }
                return Err(HarvesterError::Http(e));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| HarvesterError::Config(format!("no response from {url}"))))
}
