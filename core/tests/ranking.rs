//! Deputy ranking: ordering, determinism, snapshot publication and
//! cancellation.

mod common;

use chrono::Duration;
use common::{Fixture, TempDb};
use standing_core::{
    access::Actor,
    clock::Clock,
    error::StandingError,
    ranking::{CancellationToken, DeputyRankingRecalculator},
};
use std::thread;

/// Resolve one complaint for `deputy` worth `points`, taking `hours`.
fn resolve_one(fx: &Fixture, deputy: &Actor, deputy_id: &str, points: i64, hours: i64) {
    let citizen = fx.citizen("Resident");
    let complaint = fx
        .service
        .file_complaint(
            &citizen,
            standing_core::complaint_lifecycle::NewComplaint {
                title:       "Broken streetlight".into(),
                description: "Dark since Tuesday".into(),
                category:    "lighting".into(),
                priority:    "medium".into(),
            },
        )
        .unwrap();
    let id = complaint.complaint_id.as_str();
    fx.service.assign_complaint(&fx.admin, id, deputy_id, None).unwrap();
    fx.service.deputy_accept(deputy, id, None).unwrap();
    fx.clock.advance(Duration::hours(hours));
    fx.service.resolve_complaint(deputy, id, points, None).unwrap();
}

fn ranks(fx: &Fixture) -> Vec<(String, Option<i64>)> {
    fx.service
        .leaderboard()
        .unwrap()
        .into_iter()
        .map(|s| (s.deputy_id, s.rank))
        .collect()
}

#[test]
fn ranks_follow_points_then_speed() {
    let fx = Fixture::in_memory();
    let (slow, slow_id) = fx.deputy("Slow");
    let (fast, fast_id) = fx.deputy("Fast");
    let (top, top_id) = fx.deputy("Top");
    resolve_one(&fx, &slow, &slow_id, 10, 30);
    resolve_one(&fx, &fast, &fast_id, 10, 2);
    resolve_one(&fx, &top, &top_id, 25, 80);

    let report = fx.service.recompute_ranks(&fx.admin).unwrap();
    assert_eq!(report.ranked, 3);

    assert_eq!(
        ranks(&fx),
        vec![(top_id, Some(1)), (fast_id, Some(2)), (slow_id, Some(3))]
    );
}

#[test]
fn recomputation_is_deterministic() {
    let fx = Fixture::in_memory();
    let mut deputies = Vec::new();
    for i in 0..6 {
        deputies.push(fx.deputy(&format!("deputy-{i}")));
    }
    // Identical records everywhere: only the id can break the tie.
    for (actor, id) in &deputies {
        resolve_one(&fx, actor, id, 5, 0);
    }

    fx.service.recompute_ranks(&fx.admin).unwrap();
    let first = ranks(&fx);
    fx.service.recompute_ranks(&fx.admin).unwrap();
    let second = ranks(&fx);
    assert_eq!(first, second);

    let mut by_id: Vec<String> = deputies.into_iter().map(|(_, id)| id).collect();
    by_id.sort();
    let ordered: Vec<String> = first.into_iter().map(|(id, _)| id).collect();
    assert_eq!(ordered, by_id);
}

/// Ranks are a published snapshot: later resolutions only show up after
/// the next run, and `as_of` says when the snapshot was taken.
#[test]
fn ranks_lag_live_points_until_next_run() {
    let fx = Fixture::in_memory();
    let (a, a_id) = fx.deputy("Ash");
    let (b, b_id) = fx.deputy("Bay");
    resolve_one(&fx, &a, &a_id, 10, 1);
    resolve_one(&fx, &b, &b_id, 5, 1);

    assert!(fx.service.latest_ranking().unwrap().is_none());
    let first = fx.service.recompute_ranks(&fx.admin).unwrap();
    assert_eq!(first.as_of, fx.clock.now());

    resolve_one(&fx, &b, &b_id, 20, 1);
    assert_eq!(ranks(&fx)[0], (a_id.clone(), Some(1)));

    let second = fx.service.recompute_ranks(&fx.admin).unwrap();
    assert!(second.as_of > first.as_of);
    assert_eq!(fx.service.latest_ranking().unwrap(), Some(second));
    assert_eq!(ranks(&fx)[0], (b_id, Some(1)));
}

#[test]
fn cancelled_run_keeps_previous_ranks() {
    let fx = Fixture::in_memory();
    let (a, a_id) = fx.deputy("Cy");
    let (b, b_id) = fx.deputy("Di");
    resolve_one(&fx, &a, &a_id, 10, 1);
    resolve_one(&fx, &b, &b_id, 5, 1);
    let published = fx.service.recompute_ranks(&fx.admin).unwrap();
    resolve_one(&fx, &b, &b_id, 50, 1);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = DeputyRankingRecalculator::new(fx.service.store(), fx.clock.as_ref(), 1)
        .with_cancellation(cancel)
        .recompute_ranks()
        .unwrap_err();

    assert!(matches!(err, StandingError::Cancelled));
    assert_eq!(ranks(&fx), vec![(a_id.clone(), Some(1)), (b_id.clone(), Some(2))]);
    assert_eq!(fx.service.latest_ranking().unwrap(), Some(published));

    // Resuming is a plain re-run.
    DeputyRankingRecalculator::new(fx.service.store(), fx.clock.as_ref(), 1)
        .recompute_ranks()
        .unwrap();
    assert_eq!(ranks(&fx), vec![(b_id, Some(1)), (a_id, Some(2))]);
}

#[test]
fn small_batches_rank_everyone() {
    let fx = Fixture::in_memory();
    for i in 0..7 {
        let (actor, id) = fx.deputy(&format!("d{i}"));
        resolve_one(&fx, &actor, &id, i, 1);
    }
    let report = DeputyRankingRecalculator::new(fx.service.store(), fx.clock.as_ref(), 3)
        .recompute_ranks()
        .unwrap();
    assert_eq!(report.ranked, 7);
    let ranked: Vec<i64> = ranks(&fx).into_iter().filter_map(|(_, r)| r).collect();
    assert_eq!(ranked, (1..=7).collect::<Vec<_>>());
}

#[test]
fn only_admins_trigger_ranking() {
    let fx = Fixture::in_memory();
    let citizen = fx.citizen("Eda");
    let err = fx.service.recompute_ranks(&citizen).unwrap_err();
    assert!(matches!(err, StandingError::PermissionDenied(_)));
}

/// Rank runs on one connection while resolutions commit on another;
/// neither side fails, and the next run sees every resolution.
#[test]
fn resolutions_commit_while_ranks_are_recomputed() {
    let db = TempDb::new();
    let fx = Fixture::on_file(&db);
    let mut accepted = Vec::new();
    for i in 0..8 {
        let (deputy, deputy_id) = fx.deputy(&format!("deputy-{i}"));
        let citizen = fx.citizen("Resident");
        let complaint = fx
            .service
            .file_complaint(
                &citizen,
                standing_core::complaint_lifecycle::NewComplaint {
                    title:       "Blocked drain".into(),
                    description: "Water pooling at the corner".into(),
                    category:    "drainage".into(),
                    priority:    "low".into(),
                },
            )
            .unwrap();
        let id = complaint.complaint_id;
        fx.service.assign_complaint(&fx.admin, &id, &deputy_id, None).unwrap();
        fx.service.deputy_accept(&deputy, &id, None).unwrap();
        accepted.push((deputy, id));
    }

    let store = db.open();
    let clock = fx.clock.clone();
    let ranker = thread::spawn(move || {
        let clock: &dyn Clock = clock.as_ref();
        (0..5)
            .map(|_| DeputyRankingRecalculator::new(&store, clock, 2).recompute_ranks())
            .collect::<Vec<_>>()
    });
    for (deputy, id) in &accepted {
        fx.service.resolve_complaint(deputy, id, 5, None).unwrap();
    }
    let runs = ranker.join().unwrap();
    assert!(runs.iter().all(|r| r.is_ok()), "{runs:?}");

    let report = fx.service.recompute_ranks(&fx.admin).unwrap();
    assert_eq!(report.ranked, 8);
    let board = fx.service.leaderboard().unwrap();
    assert!(board.iter().all(|s| s.total_points == 5 && s.rank.is_some()), "{board:?}");
}
