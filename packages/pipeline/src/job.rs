//! The unit of work the scheduler triggers.

use async_trait::async_trait;
use rand::Rng;
use vacancy_harvester::dedup::DedupStore;
use vacancy_harvester::{HarvestConfig, HarvestOptions, Harvester, HttpSession, ScrapeRun};

use crate::config::SchedulerConfig;
use crate::error::Result;

/// One harvest run, as seen by the scheduler.
///
/// `Ok` carries the run summary whatever its status; `Err` means the run
/// could not be carried out at all.
#[async_trait]
pub trait HarvestJob: Send + Sync + 'static {
    async fn run(&self) -> Result<ScrapeRun>;
}

/// Harvest over HTTP with an occasional dedup sweep before the run.
#[derive(Debug, Clone)]
pub struct ScheduledHarvest {
    config: HarvestConfig,
    options: HarvestOptions,
    eviction_probability: f64,
    retention: chrono::Duration,
}

impl ScheduledHarvest {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            config: config.harvest.clone(),
            options: config.options,
            eviction_probability: config.eviction_probability,
            retention: config.retention,
        }
    }
}

#[async_trait]
impl HarvestJob for ScheduledHarvest {
    async fn run(&self) -> Result<ScrapeRun> {
        let config = self.config.clone();
        let options = self.options;
        let evict = rand::thread_rng().gen_bool(self.eviction_probability.clamp(0.0, 1.0));
        let retention = self.retention;

        let run = tokio::task::spawn_blocking(move || -> Result<ScrapeRun> {
            let session = HttpSession::with_timeout(config.fetch_timeout)?
                .with_settle(config.page_settle);
            let mut harvester = Harvester::new(session, config)?;
            if evict {
                sweep(harvester.dedup_mut(), retention);
            }
            Ok(harvester.run(&options).run)
        })
        .await??;

        Ok(run)
    }
}

/// Evict records older than `retention`; failures only log.
pub fn sweep(store: &mut DedupStore, retention: chrono::Duration) -> usize {
    match store.evict_older_than(retention) {
        Ok(evicted) => {
            tracing::info!(evicted, remaining = store.len(), "dedup sweep finished");
            evicted
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %store.path().display(), "dedup sweep failed");
            0
        }
    }
}
