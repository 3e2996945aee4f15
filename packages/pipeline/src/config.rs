use std::net::SocketAddr;
use std::time::Duration;

use vacancy_harvester::{HarvestConfig, HarvestOptions};

use crate::error::{PipelineError, Result};

/// Pages scanned per scheduled run unless `VACANCY_MAX_PAGES` is set.
pub const SCHEDULED_MAX_PAGES: u32 = 2;

/// New postings fetched per scheduled run unless `VACANCY_MAX_JOBS` is set.
pub const SCHEDULED_MAX_JOBS: usize = 10;

/// Request delay of scheduled runs unless `VACANCY_REQUEST_DELAY_MS` is set.
pub const SCHEDULED_REQUEST_DELAY_MS: u64 = 1500;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between scheduled runs.
    pub interval: Duration,
    /// Delay before the first run after `start`.
    pub initial_delay: Duration,
    /// Chance, per run, of sweeping old dedup records first.
    pub eviction_probability: f64,
    pub retention: chrono::Duration,
    /// Number of recent runs kept in the status history.
    pub history_size: usize,
    pub bind_addr: SocketAddr,
    pub harvest: HarvestConfig,
    pub options: HarvestOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let harvest = HarvestConfig::default()
            .with_request_delay(Duration::from_millis(SCHEDULED_REQUEST_DELAY_MS));
        let options = HarvestOptions {
            max_pages: SCHEDULED_MAX_PAGES,
            max_jobs: Some(SCHEDULED_MAX_JOBS),
            include_sponsored: harvest.include_sponsored,
        };

        Self {
            interval: Duration::from_secs(300),
            initial_delay: Duration::from_secs(5),
            eviction_probability: 0.1,
            retention: chrono::Duration::days(vacancy_harvester::config::DEFAULT_RETENTION_DAYS),
            history_size: 20,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            harvest,
            options,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration through an arbitrary key lookup.
    ///
    /// Numeric values that do not parse keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let mut harvest = HarvestConfig::from_lookup(&lookup)?;
        if lookup("VACANCY_REQUEST_DELAY_MS").is_none() {
            harvest.request_delay = defaults.harvest.request_delay;
        }

        let options = HarvestOptions {
            max_pages: parse_u64("VACANCY_MAX_PAGES")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.options.max_pages),
            max_jobs: parse_u64("VACANCY_MAX_JOBS")
                .and_then(|v| usize::try_from(v).ok())
                .or(defaults.options.max_jobs),
            include_sponsored: harvest.include_sponsored,
        };

        let eviction_probability = lookup("VACANCY_EVICTION_PROBABILITY")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 1.0))
            .unwrap_or(defaults.eviction_probability);

        let bind_addr = match lookup("VACANCY_BIND_ADDR") {
            Some(addr) => addr.trim().parse().map_err(|e| {
                PipelineError::Config(format!("invalid VACANCY_BIND_ADDR '{addr}': {e}"))
            })?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            interval: parse_u64("VACANCY_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            initial_delay: parse_u64("VACANCY_INITIAL_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.initial_delay),
            eviction_probability,
            retention: parse_u64("VACANCY_RETENTION_DAYS")
                .and_then(|days| i64::try_from(days).ok())
                .and_then(chrono::Duration::try_days)
                .unwrap_or(defaults.retention),
            history_size: parse_u64("VACANCY_HISTORY_SIZE")
                .and_then(|v| usize::try_from(v).ok())
                .map(|size| size.max(1))
                .unwrap_or(defaults.history_size),
            bind_addr,
            harvest,
            options,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size.max(1);
        self
    }

    pub fn with_harvest(mut self, harvest: HarvestConfig) -> Self {
        self.harvest = harvest;
        self
    }

    pub fn with_eviction_probability(mut self, probability: f64) -> Self {
        self.eviction_probability = probability.clamp(0.0, 1.0);
        self
    }
}
