//! Periodic harvest scheduling.
//!
//! The scheduler is either stopped or running. While running it triggers the
//! job once after the initial delay and then on every interval tick. A tick
//! that arrives while a run is still in flight is skipped, not queued; runs
//! never overlap. A failing run is recorded and the next tick proceeds as
//! usual.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vacancy_harvester::ScrapeRun;

use crate::config::SchedulerConfig;
use crate::job::HarvestJob;

/// Source of the current time for next-run computation.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

/// A finished run with its scheduler bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub trigger: RunTrigger,
    pub run: ScrapeRun,
}

/// Cumulative counters since the scheduler was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Ticks dropped because a run was still in flight.
    pub skipped_overlaps: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub run_in_flight: bool,
    pub last_run: Option<RunRecord>,
    pub stats: SchedulerStats,
    pub next_run: Option<DateTime<Utc>>,
    pub interval_secs: u64,
    /// Most recent runs, oldest first.
    pub history: Vec<RunRecord>,
}

/// Scheduling parameters taken from [`SchedulerConfig`].
#[derive(Debug, Clone, Copy)]
struct Timing {
    interval: Duration,
    initial_delay: Duration,
    history_size: usize,
}

#[derive(Default)]
struct State {
    cancel: Option<CancellationToken>,
    started_at: Option<DateTime<Utc>>,
    last_tick_at: Option<DateTime<Utc>>,
    stats: SchedulerStats,
    history: VecDeque<RunRecord>,
}

struct Inner {
    job: Arc<dyn HarvestJob>,
    clock: Arc<dyn Clock>,
    timing: Timing,
    state: Mutex<State>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a run ends, including by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the scheduler; clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(job: impl HarvestJob, config: &SchedulerConfig, clock: impl Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                job: Arc::new(job),
                clock: Arc::new(clock),
                timing: Timing {
                    interval: config.interval,
                    initial_delay: config.initial_delay,
                    history_size: config.history_size.max(1),
                },
                state: Mutex::new(State::default()),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Start the periodic loop. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let token = {
            let mut state = self.inner.lock();
            if state.cancel.is_some() {
                tracing::warn!("scheduler already running, ignoring start");
                return false;
            }
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            state.started_at = Some(self.inner.clock.now());
            token
        };

        tracing::info!(
            interval = ?self.inner.timing.interval,
            initial_delay = ?self.inner.timing.initial_delay,
            "scheduler started"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.timing.initial_delay) => {}
            }

            let mut ticker = tokio::time::interval(inner.timing.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                inner.lock().last_tick_at = Some(inner.clock.now());

                // Runs go to their own task so the loop keeps ticking and can
                // observe overlaps
                let run_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    run_inner.run_once(RunTrigger::Scheduled).await;
                });
            }
            tracing::debug!("scheduler loop exited");
        });

        true
    }

    /// Stop the periodic loop. Returns `false` if it was not running.
    ///
    /// A run already in flight completes and is recorded.
    pub fn stop(&self) -> bool {
        let token = self.inner.lock().cancel.take();
        match token {
            Some(token) => {
                token.cancel();
                self.inner.lock().started_at = None;
                tracing::info!("scheduler stopped");
                true
            }
            None => {
                tracing::debug!("scheduler not running, ignoring stop");
                false
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().cancel.is_some()
    }

    /// Start a manual run in the background.
    ///
    /// Returns `false` without starting anything if a run is in flight.
    pub fn trigger_now(&self) -> bool {
        if self.inner.in_flight.load(Ordering::Acquire) {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_once(RunTrigger::Manual).await;
        });
        true
    }

    /// Run the job now and wait for it. `None` if a run was already in flight.
    pub async fn run_once(&self, trigger: RunTrigger) -> Option<RunRecord> {
        self.inner.run_once(trigger).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let now = self.inner.clock.now();
        let state = self.inner.lock();
        SchedulerStatus {
            is_running: state.cancel.is_some(),
            run_in_flight: self.inner.in_flight.load(Ordering::Acquire),
            last_run: state.history.back().cloned(),
            stats: state.stats.clone(),
            next_run: next_run(&state, self.inner.timing, now),
            interval_secs: self.inner.timing.interval.as_secs(),
            history: state.history.iter().cloned().collect(),
        }
    }
}

/// The next scheduled run while running: the first run after the initial
/// delay, then one interval after the latest scheduled tick, never in the
/// past. Manual runs do not move it.
fn next_run(state: &State, timing: Timing, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let started_at = state.started_at?;
    let after = |at: DateTime<Utc>, delay: Duration| {
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| at.checked_add_signed(delay))
    };

    let next = match state.last_tick_at {
        Some(tick) if tick >= started_at => after(tick, timing.interval)?,
        _ => after(started_at, timing.initial_delay)?,
    };
    Some(next.max(now))
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Poisoning only follows a panic while recording; the state stays usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_once(&self, trigger: RunTrigger) -> Option<RunRecord> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.lock().stats.skipped_overlaps += 1;
            tracing::warn!(%trigger, "previous run still in flight, skipping");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        let id = Uuid::new_v4();
        let started_at = self.clock.now();
        tracing::info!(run_id = %id, %trigger, "harvest run starting");

        let run = match self.job.run().await {
            Ok(run) => run,
            Err(e) => {
                let mut run = ScrapeRun::begin(started_at);
                run.fail(self.clock.now(), e.to_string());
                run
            }
        };

        let record = RunRecord { id, trigger, run };
        self.record(&record);
        Some(record)
    }

    fn record(&self, record: &RunRecord) {
        let mut state = self.lock();
        let stats = &mut state.stats;
        stats.total_runs += 1;
        if record.run.is_success() {
            stats.successful_runs += 1;
            tracing::info!(
                run_id = %record.id,
                new_jobs = record.run.new_jobs,
                written = record.run.written,
                "harvest run succeeded"
            );
        } else {
            stats.failed_runs += 1;
            stats.last_error.clone_from(&record.run.error);
            tracing::error!(
                run_id = %record.id,
                error = record.run.error.as_deref().unwrap_or("unknown"),
                "harvest run failed"
            );
        }

        state.history.push_back(record.clone());
        while state.history.len() > self.timing.history_size {
            state.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// Wall clock that follows tokio time, so paused tests see it advance.
    struct TokioClock {
        base: DateTime<Utc>,
        origin: tokio::time::Instant,
    }

    impl TokioClock {
        fn new() -> Self {
            Self {
                base: t0(),
                origin: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 16, 8, 0, 0).unwrap()
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Success,
        Failed,
        Error,
    }

    struct FakeJob {
        calls: Arc<AtomicUsize>,
        outcome: Outcome,
        duration: Duration,
    }

    impl FakeJob {
        fn new(outcome: Outcome) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                    outcome,
                    duration: Duration::ZERO,
                },
                calls,
            )
        }

        fn taking(mut self, duration: Duration) -> Self {
            self.duration = duration;
            self
        }
    }

    #[async_trait]
    impl HarvestJob for FakeJob {
        async fn run(&self) -> Result<ScrapeRun> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.duration.is_zero() {
                tokio::time::sleep(self.duration).await;
            }
            let mut run = ScrapeRun::begin(t0());
            match self.outcome {
                Outcome::Success => run.succeed(t0()),
                Outcome::Failed => {
                    run.fail(t0(), "No posting links found after scanning 1 page(s)");
                }
                Outcome::Error => {
                    return Err(PipelineError::Config("session unavailable".into()));
                }
            }
            Ok(run)
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
            .with_interval(Duration::from_secs(300))
            .with_initial_delay(Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let (job, _) = FakeJob::new(Outcome::Success);
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));

        assert!(!scheduler.stop());
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_initial_delay_then_every_interval() {
        let (job, calls) = FakeJob::new(Outcome::Success);
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let status = scheduler.status();
        assert_eq!(status.stats.total_runs, 2);
        assert_eq!(status.stats.successful_runs, 2);
        assert_eq!(status.last_run.unwrap().trigger, RunTrigger::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_and_scheduling_continues() {
        let (job, calls) = FakeJob::new(Outcome::Error);
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(5 + 300 + 1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let status = scheduler.status();
        assert!(status.is_running);
        assert_eq!(status.stats.failed_runs, 2);
        assert_eq!(status.stats.successful_runs, 0);
        assert_eq!(
            status.stats.last_error.as_deref(),
            Some("configuration error: session unavailable")
        );
        let last = status.last_run.unwrap();
        assert!(!last.run.is_success());
        assert!(last.run.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_summary_counts_as_failed() {
        let (job, _) = FakeJob::new(Outcome::Failed);
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));

        let record = scheduler.run_once(RunTrigger::Manual).await.unwrap();
        assert!(!record.run.is_success());

        let stats = scheduler.status().stats;
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.failed_runs, 1);
        assert!(stats.last_error.unwrap().contains("No posting links"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let (job, calls) = FakeJob::new(Outcome::Success);
        let job = job.taking(Duration::from_secs(400));
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));
        scheduler.start();

        // First run starts at 5s and lasts until 405s; the tick at 305s is dropped
        tokio::time::sleep(Duration::from_secs(310)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.status().run_in_flight);
        assert!(!scheduler.trigger_now());

        tokio::time::sleep(Duration::from_secs(100)).await;
        let status = scheduler.status();
        assert_eq!(status.stats.skipped_overlaps, 1);
        assert_eq!(status.stats.total_runs, 1);
        assert!(!status.run_in_flight);

        // The next tick at 605s runs normally
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_now_runs_manually() {
        let (job, calls) = FakeJob::new(Outcome::Success);
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));

        assert!(scheduler.trigger_now());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let status = scheduler.status();
        assert!(!status.is_running);
        assert_eq!(status.last_run.unwrap().trigger, RunTrigger::Manual);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (job, _) = FakeJob::new(Outcome::Success);
        let scheduler = Scheduler::new(job, &config().with_history_size(2), FixedClock(t0()));

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(scheduler.run_once(RunTrigger::Manual).await.unwrap().id);
        }

        let status = scheduler.status();
        assert_eq!(status.stats.total_runs, 3);
        let history: Vec<Uuid> = status.history.iter().map(|r| r.id).collect();
        assert_eq!(history, ids[1..].to_vec());
        assert_eq!(status.last_run.unwrap().id, ids[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_run() {
        let (job, _) = FakeJob::new(Outcome::Success);
        let scheduler = Scheduler::new(job, &config(), FixedClock(t0()));
        assert_eq!(scheduler.status().next_run, None);

        scheduler.start();
        assert_eq!(
            scheduler.status().next_run,
            Some(t0() + chrono::Duration::seconds(5))
        );
        scheduler.stop();
        assert_eq!(scheduler.status().next_run, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_run_does_not_move_next_run() {
        let (job, calls) = FakeJob::new(Outcome::Success);
        let scheduler = Scheduler::new(job, &config(), TokioClock::new());
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.trigger_now());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            scheduler.status().next_run,
            Some(t0() + chrono::Duration::seconds(305))
        );

        tokio::time::sleep(Duration::from_secs(205)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            scheduler.status().next_run,
            Some(t0() + chrono::Duration::seconds(605))
        );
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_tick_still_moves_next_run() {
        let (job, _) = FakeJob::new(Outcome::Success);
        let job = job.taking(Duration::from_secs(400));
        let scheduler = Scheduler::new(job, &config(), TokioClock::new());
        scheduler.start();

        // Run from 5s to 405s; the tick at 305s is skipped
        tokio::time::sleep(Duration::from_secs(310)).await;
        let status = scheduler.status();
        assert_eq!(status.stats.skipped_overlaps, 1);
        assert_eq!(status.next_run, Some(t0() + chrono::Duration::seconds(605)));
        scheduler.stop();
    }

    #[test]
    fn test_next_run_after_tick() {
        let timing = Timing {
            interval: Duration::from_secs(300),
            initial_delay: Duration::from_secs(5),
            history_size: 20,
        };
        let state = State {
            started_at: Some(t0()),
            last_tick_at: Some(t0() + chrono::Duration::seconds(5)),
            ..State::default()
        };

        let now = t0() + chrono::Duration::seconds(60);
        assert_eq!(
            next_run(&state, timing, now),
            Some(t0() + chrono::Duration::seconds(305))
        );
        // A late tick never reports a time in the past
        let late = t0() + chrono::Duration::seconds(400);
        assert_eq!(next_run(&state, timing, late), Some(late));
    }

    #[test]
    fn test_run_trigger_display() {
        assert_eq!(RunTrigger::Scheduled.to_string(), "scheduled");
        assert_eq!(RunTrigger::Manual.to_string(), "manual");
    }
}
