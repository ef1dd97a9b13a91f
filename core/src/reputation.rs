//! Reputation aggregation: the publicly displayed deputy rating.
//!
//! The displayed rating blends an administrator-set baseline (reputation
//! from before the platform) with live citizen ratings:
//!
//!   average = (baseline_average * baseline_count + Σ ratings)
//!             / (baseline_count + |ratings|)
//!   count   = baseline_count + |ratings|
//!
//! `displayed_*` on the profile is a write-time cache. Every write that can
//! change the inputs (a rating upsert, a baseline edit) recomputes it from
//! the full rating set inside the same transaction, never by applying a
//! delta, so edits and concurrent submissions cannot drift it.

use crate::{
    clock::Clock,
    error::{StandingError, StandingResult},
    event::{dispatch, NotificationSink, StandingEvent},
    store::StandingStore,
    types::{AccountId, DeputyId, Timestamp},
};
use serde::{Deserialize, Serialize};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub citizen_id: AccountId,
    pub deputy_id:  DeputyId,
    pub value:      u8,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count:   i64,
}

/// Blend a baseline with the live rating totals. A zero denominator
/// yields no average rather than a division by zero.
pub fn blend(
    baseline_average: f64,
    baseline_count:   i64,
    ratings_sum:      i64,
    ratings_count:    i64,
) -> RatingSummary {
    let count = baseline_count + ratings_count;
    let average = if count == 0 {
        None
    } else {
        Some((baseline_average * baseline_count as f64 + ratings_sum as f64) / count as f64)
    };
    RatingSummary { average, count }
}

pub struct ReputationAggregator<'a> {
    store: &'a StandingStore,
    clock: &'a dyn Clock,
    sink:  &'a dyn NotificationSink,
}

impl<'a> ReputationAggregator<'a> {
    pub fn new(
        store: &'a StandingStore,
        clock: &'a dyn Clock,
        sink:  &'a dyn NotificationSink,
    ) -> Self {
        Self { store, clock, sink }
    }

    /// Record (or replace) a citizen's rating of a deputy and refresh the
    /// deputy's displayed rating.
    pub fn submit_rating(
        &self,
        citizen_id: &str,
        deputy_id:  &str,
        value:      i64,
    ) -> StandingResult<RatingSummary> {
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(StandingError::Validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {value}"
            )));
        }
        let value = value as u8;
        let now = self.clock.now();

        let tx = self.store.begin_write()?;
        if !self.store.deputy_exists(deputy_id)? {
            return Err(StandingError::DeputyNotFound(deputy_id.to_string()));
        }
        if !self.store.account_exists(citizen_id)? {
            return Err(StandingError::AccountNotFound(citizen_id.to_string()));
        }
        self.store.upsert_rating(citizen_id, deputy_id, value, now)?;
        let summary = self.recompute(deputy_id)?;
        let event = StandingEvent::RatingSubmitted {
            citizen_id: citizen_id.to_string(),
            deputy_id:  deputy_id.to_string(),
            value,
            average:    summary.average,
            count:      summary.count,
        };
        self.store.append_event("reputation", now, &event)?;
        tx.commit()?;

        log::debug!(
            "rating {value} from {citizen_id} for {deputy_id}: displayed {:?} over {}",
            summary.average,
            summary.count
        );
        dispatch(self.sink, &event);
        Ok(summary)
    }

    /// Replace a deputy's baseline and refresh the displayed rating.
    /// Administrator capability; enforcement happens upstream.
    pub fn set_baseline(
        &self,
        deputy_id: &str,
        average:   f64,
        count:     i64,
    ) -> StandingResult<RatingSummary> {
        if !average.is_finite() || !(0.0..=MAX_RATING as f64).contains(&average) {
            return Err(StandingError::Validation(format!(
                "baseline average must be within [0, {MAX_RATING}], got {average}"
            )));
        }
        if count < 0 {
            return Err(StandingError::Validation(format!(
                "baseline count must not be negative, got {count}"
            )));
        }
        let now = self.clock.now();

        let tx = self.store.begin_write()?;
        if self.store.write_baseline(deputy_id, average, count)? == 0 {
            return Err(StandingError::DeputyNotFound(deputy_id.to_string()));
        }
        let summary = self.recompute(deputy_id)?;
        let event = StandingEvent::BaselineSet {
            deputy_id: deputy_id.to_string(),
            average:   summary.average,
            count:     summary.count,
        };
        self.store.append_event("reputation", now, &event)?;
        tx.commit()?;

        log::info!("baseline for {deputy_id} set to {average:.2} x {count}");
        dispatch(self.sink, &event);
        Ok(summary)
    }

    /// The cached displayed rating.
    pub fn rating_summary(&self, deputy_id: &str) -> StandingResult<RatingSummary> {
        let profile = self
            .store
            .get_deputy_profile(deputy_id)?
            .ok_or_else(|| StandingError::DeputyNotFound(deputy_id.to_string()))?;
        Ok(RatingSummary {
            average: profile.displayed_average,
            count:   profile.displayed_count,
        })
    }

    pub fn citizen_rating(&self, citizen_id: &str, deputy_id: &str) -> StandingResult<Option<Rating>> {
        self.store.get_rating(citizen_id, deputy_id)
    }

    /// Rebuild every deputy's displayed rating from source. Repair tool for
    /// caches written by an older build; returns the number refreshed.
    pub fn recompute_all(&self) -> StandingResult<usize> {
        let tx = self.store.begin_write()?;
        let profiles = self.store.list_deputy_profiles()?;
        for profile in &profiles {
            self.recompute(&profile.deputy_id)?;
        }
        tx.commit()?;
        Ok(profiles.len())
    }

    /// Recompute from the baseline and the full rating set. Runs inside
    /// the caller's transaction.
    fn recompute(&self, deputy_id: &str) -> StandingResult<RatingSummary> {
        let profile = self
            .store
            .get_deputy_profile(deputy_id)?
            .ok_or_else(|| StandingError::DeputyNotFound(deputy_id.to_string()))?;
        let (ratings_count, ratings_sum) = self.store.rating_totals(deputy_id)?;
        let summary = blend(
            profile.baseline_average,
            profile.baseline_count,
            ratings_sum,
            ratings_count,
        );
        self.store
            .write_displayed_rating(deputy_id, summary.average, summary.count)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_weights_baseline_by_count() {
        let s = blend(4.0, 10, 2, 1);
        assert_eq!(s.count, 11);
        let avg = s.average.unwrap();
        assert!((avg - 42.0 / 11.0).abs() < 1e-12, "got {avg}");
    }

    #[test]
    fn blend_with_nothing_has_no_average() {
        assert_eq!(blend(0.0, 0, 0, 0), RatingSummary { average: None, count: 0 });
    }

    #[test]
    fn zero_count_baseline_is_ignored() {
        let s = blend(5.0, 0, 3, 1);
        assert_eq!(s.average, Some(3.0));
    }
}
