//! Orphan grant reconciliation.
//!
//! Role elevation is a two-step write with a best-effort compensating
//! delete. When the compensation itself fails, the account keeps a
//! deputy/manager grant with no profile or permission row behind it.
//! This sweep finds such grants once they are older than the grace period
//! (younger ones may belong to an elevation still in flight) and removes
//! them, logging each repair.

use crate::{
    clock::Clock,
    error::StandingResult,
    event::StandingEvent,
    scheduler::ScheduledJob,
    store::{OrphanGrant, StandingStore},
    types::Timestamp,
};
use chrono::Duration;
use std::sync::Arc;

pub struct OrphanReconciler<'a> {
    store: &'a StandingStore,
    clock: &'a dyn Clock,
    grace: Duration,
}

impl<'a> OrphanReconciler<'a> {
    pub fn new(store: &'a StandingStore, clock: &'a dyn Clock, grace: Duration) -> Self {
        Self { store, clock, grace }
    }

    /// Orphans that a sweep right now would remove.
    pub fn find_orphans(&self) -> StandingResult<Vec<OrphanGrant>> {
        self.store.orphan_grants(self.clock.now() - self.grace)
    }

    /// Remove every orphan grant past the grace period. Returns the repairs.
    pub fn sweep(&self) -> StandingResult<Vec<OrphanGrant>> {
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        let orphans = self.store.orphan_grants(now - self.grace)?;
        for orphan in &orphans {
            self.store.delete_role_grant(
                &orphan.account_id,
                orphan.role,
                orphan.elevation_id.as_deref(),
            )?;
            self.store.append_event(
                "reconciliation",
                now,
                &StandingEvent::OrphanGrantRepaired {
                    account_id:   orphan.account_id.clone(),
                    role:         orphan.role,
                    elevation_id: orphan.elevation_id.clone(),
                },
            )?;
            log::warn!(
                "removed orphan {} grant for {} (granted {}, elevation {:?})",
                orphan.role,
                orphan.account_id,
                orphan.granted_at,
                orphan.elevation_id
            );
        }
        tx.commit()?;
        Ok(orphans)
    }
}

/// Scheduled wrapper around `OrphanReconciler`.
pub struct OrphanReconciliationJob {
    store:    StandingStore,
    clock:    Arc<dyn Clock>,
    grace:    Duration,
    interval: Duration,
}

impl OrphanReconciliationJob {
    pub fn new(store: StandingStore, clock: Arc<dyn Clock>, grace: Duration, interval: Duration) -> Self {
        Self { store, clock, grace, interval }
    }
}

impl ScheduledJob for OrphanReconciliationJob {
    fn name(&self) -> &'static str {
        "orphan_reconciliation"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&mut self, _now: Timestamp) -> StandingResult<Vec<StandingEvent>> {
        let reconciler = OrphanReconciler::new(&self.store, self.clock.as_ref(), self.grace);
        let repaired = reconciler.sweep()?;
        Ok(repaired
            .into_iter()
            .map(|o| StandingEvent::OrphanGrantRepaired {
                account_id:   o.account_id,
                role:         o.role,
                elevation_id: o.elevation_id,
            })
            .collect())
    }
}
