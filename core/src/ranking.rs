//! Deputy ranking: periodic batch over every DeputyScore row.
//!
//! Ranks are recomputed on a schedule, not after each resolution, so a
//! displayed rank can lag the live points. The `as_of` of the last run is
//! always published next to the ranks.
//!
//! ORDER (total, deterministic):
//!   1. total_points              descending
//!   2. average_resolution_hours  ascending (no resolutions yet sorts last)
//!   3. complaints_resolved       descending
//!   4. deputy_id                 ascending

use crate::{
    clock::Clock,
    error::{StandingError, StandingResult},
    event::StandingEvent,
    store::StandingStore,
    types::{DeputyId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeputyScore {
    pub deputy_id:                DeputyId,
    pub complaints_assigned:      i64,
    pub complaints_resolved:      i64,
    pub complaints_rejected:      i64,
    pub total_points:             i64,
    pub average_resolution_hours: Option<f64>,
    pub rank:                     Option<i64>,
    pub last_activity_at:         Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub as_of:  Timestamp,
    pub ranked: usize,
}

/// Shared stop flag for a long ranking run. The owner of the run clears
/// it with `reset` once the run is over.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, AtomicOrdering::SeqCst);
    }
}

pub fn ranking_order(a: &DeputyScore, b: &DeputyScore) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| match (a.average_resolution_hours, b.average_resolution_hours) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.complaints_resolved.cmp(&a.complaints_resolved))
        .then_with(|| a.deputy_id.cmp(&b.deputy_id))
}

pub struct DeputyRankingRecalculator<'a> {
    store:      &'a StandingStore,
    clock:      &'a dyn Clock,
    batch_size: usize,
    cancel:     CancellationToken,
}

impl<'a> DeputyRankingRecalculator<'a> {
    pub fn new(store: &'a StandingStore, clock: &'a dyn Clock, batch_size: usize) -> Self {
        Self {
            store,
            clock,
            batch_size: batch_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Rank every deputy with a score row, 1..=N, from a single read
    /// snapshot. The read and the sort hold no write lock, so resolutions
    /// keep committing meanwhile; only the rank writes, the run record and
    /// the event share the write transaction. A cancelled run rolls back
    /// and leaves the previous ranks in place; re-running resumes it.
    pub fn recompute_ranks(&self) -> StandingResult<RankingReport> {
        let snapshot = self.store.begin_read()?;
        let mut scores = self.store.all_scores()?;
        snapshot.commit()?;
        scores.sort_by(ranking_order);

        if self.cancel.is_cancelled() {
            return Err(StandingError::Cancelled);
        }
        let tx = self.store.begin_write()?;
        for (batch_idx, batch) in scores.chunks(self.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("ranking cancelled after {} of {} deputies", batch_idx * self.batch_size, scores.len());
                return Err(StandingError::Cancelled);
            }
            for (i, score) in batch.iter().enumerate() {
                let rank = (batch_idx * self.batch_size + i + 1) as i64;
                self.store.write_rank(&score.deputy_id, rank)?;
            }
        }

        let report = RankingReport {
            as_of:  self.clock.now(),
            ranked: scores.len(),
        };
        self.store.insert_ranking_run(report.as_of, report.ranked)?;
        self.store.append_event(
            "ranking",
            report.as_of,
            &StandingEvent::RanksRecomputed { as_of: report.as_of, ranked: report.ranked },
        )?;
        tx.commit()?;

        log::info!("ranked {} deputies as of {}", report.ranked, report.as_of);
        Ok(report)
    }

    /// When ranks were last computed, if ever.
    pub fn latest_ranking(&self) -> StandingResult<Option<RankingReport>> {
        self.store.latest_ranking_run()
    }

    /// Scores in published rank order; unranked deputies (scored since the
    /// last run) follow, by id.
    pub fn leaderboard(&self) -> StandingResult<Vec<DeputyScore>> {
        let mut scores = self.store.all_scores()?;
        scores.sort_by(|a, b| match (a.rank, b.rank) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.deputy_id.cmp(&b.deputy_id),
        });
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(id: &str, points: i64, hours: Option<f64>, resolved: i64) -> DeputyScore {
        DeputyScore {
            deputy_id:                id.to_string(),
            complaints_assigned:      resolved,
            complaints_resolved:      resolved,
            complaints_rejected:      0,
            total_points:             points,
            average_resolution_hours: hours,
            rank:                     None,
            last_activity_at:         None,
        }
    }

    fn order(mut scores: Vec<DeputyScore>) -> Vec<String> {
        scores.sort_by(ranking_order);
        scores.into_iter().map(|s| s.deputy_id).collect()
    }

    #[test]
    fn reset_token_is_live_again() {
        let token = CancellationToken::new();
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!shared.is_cancelled());
    }

    #[test]
    fn points_dominate() {
        let ids = order(vec![score("a", 10, Some(1.0), 1), score("b", 20, Some(90.0), 1)]);
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn faster_resolution_breaks_point_ties() {
        let ids = order(vec![
            score("slow", 10, Some(48.0), 2),
            score("none", 10, None, 0),
            score("fast", 10, Some(2.5), 2),
        ]);
        assert_eq!(ids, ["fast", "slow", "none"]);
    }

    #[test]
    fn resolved_count_then_id_break_remaining_ties() {
        let ids = order(vec![
            score("c", 10, Some(5.0), 1),
            score("b", 10, Some(5.0), 3),
            score("a", 10, Some(5.0), 1),
        ]);
        assert_eq!(ids, ["b", "a", "c"]);
    }
}
