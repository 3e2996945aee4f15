//! The harvest orchestrator: discovery, dedup partition, sequential
//! extraction and CSV persistence for one run.

use std::thread;

use chrono::Utc;
use serde::Serialize;

use crate::challenge::fetch_with_retry;
use crate::config::{posting_id_from_url, HarvestConfig};
use crate::csv_sink::{existing_ids, AppendOutcome, CsvSink};
use crate::dedup::{DedupMeta, DedupStore};
use crate::discovery::{Discoverer, Discovery, DiscoveryOptions};
use crate::error::{ExtractionFailure, Result};
use crate::extractor::{extract, ExtractInput, KnownLiterals, RuleTable};
use crate::session::PageSession;
use crate::types::{FieldCoverage, HarvestOptions, JobPosting, ListingLink, ScrapeRun};

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestOutcome {
    pub run: ScrapeRun,
    /// Records extracted in this run, in processing order.
    pub records: Vec<JobPosting>,
    pub append: AppendOutcome,
}

/// The rule table for `config`: default rules, the configured known
/// literals and the site host for email filtering.
pub fn rule_table(config: &HarvestConfig) -> Result<RuleTable> {
    let known = match &config.known_literals {
        Some(path) => KnownLiterals::load(path)?,
        None => KnownLiterals::default(),
    };
    let mut rules = RuleTable::with_known_literals(known);
    if let Some(host) = config.site_host() {
        rules = rules.with_site_host(host);
    }
    Ok(rules)
}

/// Progress callback: `(done, total, url)` after each posting.
pub type ProgressFn = Box<dyn FnMut(usize, usize, &str) + Send>;

/// Runs harvests against one page session.
///
/// All fetches of a run go through the same session, one at a time.
pub struct Harvester<S: PageSession> {
    session: S,
    config: HarvestConfig,
    rules: RuleTable,
    dedup: DedupStore,
    sink: CsvSink,
    progress: Option<ProgressFn>,
}

impl<S: PageSession> Harvester<S> {
    /// Create a harvester, opening the dedup store and loading known literals.
    pub fn new(session: S, config: HarvestConfig) -> Result<Self> {
        let rules = rule_table(&config)?;
        let dedup = DedupStore::open(&config.dedup_db);

        Ok(Self {
            session,
            config,
            rules,
            dedup,
            sink: CsvSink::default(),
            progress: None,
        })
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn dedup_mut(&mut self) -> &mut DedupStore {
        &mut self.dedup
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Run discovery only.
    pub fn discover(&mut self, options: &HarvestOptions) -> Result<Discovery> {
        let discovery_options = DiscoveryOptions::new(&self.config, options);
        Discoverer::new(&self.config).discover(&mut self.session, &discovery_options)
    }

    /// One end-to-end run.
    ///
    /// Never fails: run-level errors (discovery empty, CSV write failure) are
    /// reported through `run.status` and `run.error`, per-URL failures through
    /// the counters.
    ///
    /// Each posting is appended to the CSV as soon as it is extracted and only
    /// then recorded in the dedup store. A crash or write failure therefore
    /// loses at most the posting in progress, which the next run picks up again.
    #[tracing::instrument(
        skip_all,
        fields(max_pages = options.max_pages, max_jobs = ?options.max_jobs)
    )]
    pub fn run(&mut self, options: &HarvestOptions) -> HarvestOutcome {
        let mut run = ScrapeRun::begin(Utc::now());
        let mut outcome_records = Vec::new();

        let discovery = match self.discover(options) {
            Ok(discovery) => discovery,
            Err(e) => {
                tracing::error!(error = %e, "discovery failed");
                run.fail(Utc::now(), e.to_string());
                return HarvestOutcome {
                    run,
                    records: outcome_records,
                    append: AppendOutcome::default(),
                };
            }
        };

        run.pages_scanned = discovery.pages_scanned;
        run.urls_discovered = discovery.links.len();
        run.sponsored_seen = discovery.sponsored;

        let (fresh, seen): (Vec<ListingLink>, Vec<ListingLink>) =
            discovery.links.into_iter().partition(|link| {
                posting_id_from_url(&link.url).is_none_or(|id| !self.dedup.has(&id))
            });
        run.skipped_already_seen = seen.len();

        let limit = options.max_jobs.unwrap_or(usize::MAX).min(fresh.len());
        tracing::info!(
            discovered = run.urls_discovered,
            new = fresh.len(),
            skipped = run.skipped_already_seen,
            processing = limit,
            "partitioned links"
        );

        let mut known = match existing_ids(&self.config.output_csv) {
            Ok(known) => known,
            Err(e) => {
                tracing::error!(error = %e, "reading existing records failed");
                run.fail(Utc::now(), e.to_string());
                return HarvestOutcome {
                    run,
                    records: outcome_records,
                    append: AppendOutcome::default(),
                };
            }
        };
        let mut append = AppendOutcome::default();
        let mut persist_error = None;

        for (index, link) in fresh.iter().take(limit).enumerate() {
            // Politeness delay before every posting fetch; the listing fetch came first
            if !self.config.request_delay.is_zero() {
                thread::sleep(self.config.request_delay);
            }

            match self.harvest_one(link) {
                Ok(posting) => {
                    // CSV row first, dedup record second
                    let written = self.sink.append_known(
                        std::slice::from_ref(&posting),
                        &self.config.output_csv,
                        &mut known,
                    );
                    match written {
                        Ok(one) => {
                            append.written += one.written;
                            append.skipped_duplicate += one.skipped_duplicate;
                            self.record_seen(link, &posting);
                            outcome_records.push(posting);
                        }
                        Err(e) => {
                            tracing::error!(
                                url = %link.url,
                                error = %e,
                                "persisting record failed"
                            );
                            outcome_records.push(posting);
                            persist_error = Some(e);
                            break;
                        }
                    }
                }
                Err(blocked) => {
                    run.failed_extractions += 1;
                    if blocked {
                        run.blocked += 1;
                    }
                }
            }

            if let Some(progress) = self.progress.as_mut() {
                progress(index + 1, limit, &link.url);
            }
        }

        run.new_jobs = outcome_records.len();
        run.coverage = FieldCoverage::of(&outcome_records);
        run.written = append.written;
        run.skipped_duplicate = append.skipped_duplicate;

        if let Some(e) = persist_error {
            run.fail(Utc::now(), e.to_string());
            return HarvestOutcome {
                run,
                records: outcome_records,
                append,
            };
        }
        run.succeed(Utc::now());

        tracing::info!(
            new_jobs = run.new_jobs,
            failed = run.failed_extractions,
            blocked = run.blocked,
            written = run.written,
            duration_ms = run.duration_ms().unwrap_or_default(),
            "run complete"
        );

        HarvestOutcome {
            run,
            records: outcome_records,
            append,
        }
    }

    /// Fetch and extract one posting.
    ///
    /// The error value tells whether the failure was a challenge that never cleared.
    fn harvest_one(&mut self, link: &ListingLink) -> std::result::Result<JobPosting, bool> {
        let page = fetch_with_retry(&mut self.session, &link.url, &self.config.retry).map_err(|e| {
            tracing::warn!(url = %link.url, error = %e, "fetch failed");
            e.is_blocked()
        })?;

        let input = ExtractInput::new(link.url.clone(), page.title, page.text);
        let mut posting = extract(&input, &self.rules).map_err(|failure| {
            tracing::warn!(url = %link.url, %failure, "extraction failed");
            failure == ExtractionFailure::ChallengePresent
        })?;
        posting.is_sponsored = link.is_sponsored();

        tracing::debug!(url = %link.url, title = %posting.title, "extracted posting");
        Ok(posting)
    }

    /// Record a persisted posting in the dedup store; failures only log.
    fn record_seen(&mut self, link: &ListingLink, posting: &JobPosting) {
        let key = posting_id_from_url(&link.url).unwrap_or_else(|| posting.posting_id.clone());
        let meta = DedupMeta::new(posting.title.clone(), posting.url.clone());
        if let Err(e) = self.dedup.upsert(&key, meta) {
            tracing::warn!(
                posting_id = %key,
                error = %e,
                "could not record posting in dedup store"
            );
        }
    }
}
