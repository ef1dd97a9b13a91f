//! Scheduler: job order, intervals, cancellation, and the standard jobs
//! running against a shared database file.

mod common;

use chrono::Duration;
use common::{init_logging, manual_clock, memory_store, Fixture, RecordingSink, TempDb};
use standing_core::{
    clock::Clock,
    config::StandingConfig,
    error::{StandingError, StandingResult},
    event::{NotificationSink, StandingEvent},
    role_elevation::RoleGrant,
    scheduler::{RankingJob, ScheduledJob, Scheduler},
    types::{Role, Timestamp},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy)]
enum Outcome {
    Succeeds,
    Cancelled,
    Fails,
}

struct CountingJob {
    name:     &'static str,
    interval: Duration,
    runs:     Arc<AtomicUsize>,
    outcome:  Outcome,
}

impl ScheduledJob for CountingJob {
    fn name(&self) -> &'static str {
        self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&mut self, _now: Timestamp) -> StandingResult<Vec<StandingEvent>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Succeeds => Ok(Vec::new()),
            Outcome::Cancelled => Err(StandingError::Cancelled),
            Outcome::Fails => Err(StandingError::Conflict("ranking table locked".into())),
        }
    }
}

fn counting(name: &'static str, minutes: i64, outcome: Outcome) -> (Box<CountingJob>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let job = CountingJob { name, interval: Duration::minutes(minutes), runs: runs.clone(), outcome };
    (Box::new(job), runs)
}

#[test]
fn jobs_run_when_due() {
    init_logging();
    let clock = manual_clock();
    let sink: Arc<dyn NotificationSink> = Arc::new(RecordingSink::default());
    let mut scheduler = Scheduler::new(clock.clone(), sink);
    let (fast, fast_runs) = counting("fast", 10, Outcome::Succeeds);
    let (slow, slow_runs) = counting("slow", 60, Outcome::Succeeds);
    scheduler.register(fast);
    scheduler.register(slow);
    assert_eq!(scheduler.job_names(), ["fast", "slow"]);

    scheduler.run_due().unwrap();
    scheduler.run_due().unwrap();
    assert_eq!(fast_runs.load(Ordering::SeqCst), 1);
    assert_eq!(slow_runs.load(Ordering::SeqCst), 1);

    clock.advance(Duration::minutes(10));
    scheduler.run_due().unwrap();
    assert_eq!(fast_runs.load(Ordering::SeqCst), 2);
    assert_eq!(slow_runs.load(Ordering::SeqCst), 1);

    clock.advance(Duration::minutes(50));
    scheduler.run_due().unwrap();
    assert_eq!(fast_runs.load(Ordering::SeqCst), 3);
    assert_eq!(slow_runs.load(Ordering::SeqCst), 2);
}

/// A cancelled run is not an error and the job is retried next tick.
#[test]
fn cancelled_job_stays_due() {
    let clock = manual_clock();
    let sink: Arc<dyn NotificationSink> = Arc::new(RecordingSink::default());
    let mut scheduler = Scheduler::new(clock.clone(), sink);
    let (job, runs) = counting("cancelled", 60, Outcome::Cancelled);
    scheduler.register(job);

    assert!(scheduler.run_due().unwrap().is_empty());
    assert!(scheduler.run_due().unwrap().is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Cancelling the ranking job stops one run, not the job.
#[test]
fn cancelled_ranking_runs_again_next_tick() {
    init_logging();
    let clock = manual_clock();
    let sink: Arc<dyn NotificationSink> = Arc::new(RecordingSink::default());
    let mut scheduler = Scheduler::new(clock.clone(), sink);
    let job = RankingJob::new(memory_store(), clock.clone(), 50, Duration::hours(1));
    let cancel = job.cancellation();
    scheduler.register(Box::new(job));

    cancel.cancel();
    assert!(scheduler.run_due().unwrap().is_empty());
    assert!(!cancel.is_cancelled());

    let events = scheduler.run_due().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StandingEvent::RanksRecomputed { ranked: 0, .. }));

    clock.advance(Duration::hours(1));
    assert_eq!(scheduler.run_due().unwrap().len(), 1);
}

/// One failing job is logged and retried; the jobs after it still run.
#[test]
fn failing_job_does_not_block_later_jobs() {
    init_logging();
    let clock = manual_clock();
    let sink: Arc<dyn NotificationSink> = Arc::new(RecordingSink::default());
    let mut scheduler = Scheduler::new(clock.clone(), sink);
    let (broken, broken_runs) = counting("broken", 60, Outcome::Fails);
    let (sweep, sweep_runs) = counting("sweep", 60, Outcome::Succeeds);
    scheduler.register(broken);
    scheduler.register(sweep);

    assert!(scheduler.run_due().unwrap().is_empty());
    assert_eq!(sweep_runs.load(Ordering::SeqCst), 1);

    // the failed job stays due, the successful one waits for its interval
    scheduler.run_due().unwrap();
    assert_eq!(broken_runs.load(Ordering::SeqCst), 2);
    assert_eq!(sweep_runs.load(Ordering::SeqCst), 1);
}

/// The standard jobs on their own connections: ranking publishes a run,
/// orphan reconciliation repairs a leftover grant once it is old enough.
#[test]
fn standard_jobs_share_the_database() {
    let db = TempDb::new();
    let fx = Fixture::on_file(&db);
    let (_, deputy_id) = fx.deputy("Ruth");
    fx.service.store().ensure_score_row(&deputy_id).unwrap();
    let stray = fx.citizen("Stray");
    fx.service
        .store()
        .insert_role_grant(&RoleGrant {
            account_id:   stray.account_id.clone(),
            role:         Role::Manager,
            elevation_id: Some("lost-elevation".into()),
            granted_at:   fx.clock.now(),
        })
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let clock: Arc<dyn Clock> = fx.clock.clone();
    let mut scheduler =
        Scheduler::build(fx.service.store(), &StandingConfig::default(), clock, sink.clone()).unwrap();
    assert_eq!(scheduler.job_names(), ["ranking", "orphan_reconciliation"]);

    let events = scheduler.run_due().unwrap();
    assert_eq!(events.len(), 1, "fresh grant must survive the grace period: {events:?}");
    assert!(matches!(events[0], StandingEvent::RanksRecomputed { ranked: 1, .. }));
    assert_eq!(fx.service.latest_ranking().unwrap().unwrap().as_of, fx.clock.now());
    assert_eq!(fx.service.leaderboard().unwrap()[0].rank, Some(1));
    assert_eq!(sink.taken(), events);

    fx.clock.advance(Duration::hours(1));
    let events = scheduler.run_due().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, StandingEvent::OrphanGrantRepaired { role: Role::Manager, .. })));
    assert!(!fx.service.has_role(&stray.account_id, Role::Manager).unwrap());
    assert_eq!(sink.taken(), events);
}
