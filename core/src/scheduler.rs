//! Periodic jobs and the scheduler that drives them.
//!
//! EXECUTION ORDER (fixed, registration order):
//!   1. Ranking recomputation
//!   2. Orphan grant reconciliation
//!
//! RULES:
//!   - A job runs when its interval has elapsed since its last successful run.
//!   - Jobs own their own store connection and persist their own events
//!     inside their transactions; the scheduler only forwards the returned
//!     events to the notification sink.
//!   - A cancelled run is not an error for the scheduler; the job stays due.
//!   - A failing job is logged and stays due; the jobs after it still run.

use crate::{
    clock::Clock,
    config::StandingConfig,
    error::{StandingError, StandingResult},
    event::{dispatch, NotificationSink, StandingEvent},
    ranking::{CancellationToken, DeputyRankingRecalculator},
    reconciliation::OrphanReconciliationJob,
    store::StandingStore,
    types::Timestamp,
};
use chrono::Duration;
use std::sync::Arc;

/// The contract every periodic job fulfils.
pub trait ScheduledJob: Send {
    /// Unique stable name for this job.
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Run once. Returns the events emitted (already persisted).
    fn run(&mut self, now: Timestamp) -> StandingResult<Vec<StandingEvent>>;
}

/// Scheduled wrapper around `DeputyRankingRecalculator`.
pub struct RankingJob {
    store:      StandingStore,
    clock:      Arc<dyn Clock>,
    batch_size: usize,
    interval:   Duration,
    cancel:     CancellationToken,
}

impl RankingJob {
    pub fn new(
        store:      StandingStore,
        clock:      Arc<dyn Clock>,
        batch_size: usize,
        interval:   Duration,
    ) -> Self {
        Self { store, clock, batch_size, interval, cancel: CancellationToken::new() }
    }

    /// Token that stops an in-flight run at the next batch boundary. It is
    /// cleared when that run ends, so the next run proceeds.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl ScheduledJob for RankingJob {
    fn name(&self) -> &'static str {
        "ranking"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&mut self, _now: Timestamp) -> StandingResult<Vec<StandingEvent>> {
        let recalculator =
            DeputyRankingRecalculator::new(&self.store, self.clock.as_ref(), self.batch_size)
                .with_cancellation(self.cancel.clone());
        let result = recalculator.recompute_ranks();
        self.cancel.reset();
        let report = result?;
        Ok(vec![StandingEvent::RanksRecomputed { as_of: report.as_of, ranked: report.ranked }])
    }
}

struct JobEntry {
    job:      Box<dyn ScheduledJob>,
    last_run: Option<Timestamp>,
}

pub struct Scheduler {
    jobs:  Vec<JobEntry>,
    clock: Arc<dyn Clock>,
    sink:  Arc<dyn NotificationSink>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { jobs: Vec::new(), clock, sink }
    }

    /// Build a scheduler with the standard jobs registered, each on its own
    /// connection reopened from `store`.
    pub fn build(
        store:  &StandingStore,
        config: &StandingConfig,
        clock:  Arc<dyn Clock>,
        sink:   Arc<dyn NotificationSink>,
    ) -> StandingResult<Self> {
        let mut scheduler = Scheduler::new(clock.clone(), sink);
        scheduler.register(Box::new(RankingJob::new(
            store.reopen()?,
            clock.clone(),
            config.ranking_batch_size,
            Duration::seconds(config.ranking_interval_secs as i64),
        )));
        scheduler.register(Box::new(OrphanReconciliationJob::new(
            store.reopen()?,
            clock,
            Duration::seconds(config.orphan_grace_secs as i64),
            Duration::seconds(config.orphan_sweep_interval_secs as i64),
        )));
        Ok(scheduler)
    }

    /// Register a job. Call in the documented execution order.
    pub fn register(&mut self, job: Box<dyn ScheduledJob>) {
        self.jobs.push(JobEntry { job, last_run: None });
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|e| e.job.name()).collect()
    }

    /// Run every job whose interval has elapsed. Jobs that have never run
    /// are always due. Returns the events of the jobs that succeeded.
    pub fn run_due(&mut self) -> StandingResult<Vec<StandingEvent>> {
        let now = self.clock.now();
        let mut emitted = Vec::new();
        for entry in &mut self.jobs {
            let due = entry
                .last_run
                .map_or(true, |last| now - last >= entry.job.interval());
            if !due {
                continue;
            }
            match entry.job.run(now) {
                Ok(events) => {
                    entry.last_run = Some(now);
                    log::debug!("job {} ran, {} event(s)", entry.job.name(), events.len());
                    for event in &events {
                        dispatch(self.sink.as_ref(), event);
                    }
                    emitted.extend(events);
                }
                Err(StandingError::Cancelled) => {
                    log::warn!("job {} cancelled; still due", entry.job.name());
                }
                Err(e) => {
                    log::error!("job {} failed; still due: {e}", entry.job.name());
                }
            }
        }
        Ok(emitted)
    }
}
