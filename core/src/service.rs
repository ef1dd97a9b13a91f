//! `StandingService`: the entry point the presentation layer calls.
//!
//! One service per request handler (each owns one connection; use
//! `handler()` to get another for a new thread). Every method checks the
//! actor's capability first, then delegates to the component that owns
//! the operation:
//!
//!   RoleElevationService       promote / demote / permissions
//!   ReputationAggregator       ratings and baselines
//!   ComplaintLifecycleManager  complaint transitions
//!   DeputyRankingRecalculator  ranks (normally via the Scheduler)

use crate::{
    access::{authorize, Actor, Capability},
    account_roles::{self, Account},
    clock::{Clock, SystemClock},
    complaint_lifecycle::{Complaint, ComplaintLifecycleManager, HistoryEntry, NewComplaint},
    config::StandingConfig,
    error::{StandingError, StandingResult},
    event::{dispatch, LogSink, NotificationSink, StandingEvent},
    ranking::{DeputyRankingRecalculator, DeputyScore, RankingReport},
    reputation::{Rating, RatingSummary, ReputationAggregator},
    role_elevation::{DeputyProfile, ManagerGrant, ManagerPermissions, RoleElevationService},
    scheduler::Scheduler,
    store::StandingStore,
    types::{DeputyStatus, Role, Timestamp},
};
use std::sync::Arc;

pub struct StandingService {
    store:  StandingStore,
    config: StandingConfig,
    clock:  Arc<dyn Clock>,
    sink:   Arc<dyn NotificationSink>,
}

impl StandingService {
    pub fn new(
        store:  StandingStore,
        config: StandingConfig,
        clock:  Arc<dyn Clock>,
        sink:   Arc<dyn NotificationSink>,
    ) -> Self {
        Self { store, config, clock, sink }
    }

    /// Open and migrate the database at `path` with the wall clock and
    /// log-backed notifications.
    pub fn open(path: &str, config: StandingConfig) -> StandingResult<Self> {
        let store = StandingStore::open_with_timeout(path, config.busy_timeout_ms)?;
        store.migrate()?;
        Ok(Self::new(store, config, Arc::new(SystemClock), Arc::new(LogSink)))
    }

    /// A second service on its own connection, for another request handler.
    pub fn handler(&self) -> StandingResult<Self> {
        Ok(Self {
            store:  self.store.reopen()?,
            config: self.config.clone(),
            clock:  self.clock.clone(),
            sink:   self.sink.clone(),
        })
    }

    /// Scheduler with the standard jobs on their own connections.
    pub fn scheduler(&self) -> StandingResult<Scheduler> {
        Scheduler::build(&self.store, &self.config, self.clock.clone(), self.sink.clone())
    }

    pub fn store(&self) -> &StandingStore {
        &self.store
    }

    pub fn config(&self) -> &StandingConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn roles(&self) -> RoleElevationService<'_, StandingStore> {
        RoleElevationService::new(&self.store, self.clock.as_ref())
    }

    fn reputation(&self) -> ReputationAggregator<'_> {
        ReputationAggregator::new(&self.store, self.clock.as_ref(), self.sink.as_ref())
    }

    fn complaints(&self) -> ComplaintLifecycleManager<'_> {
        ComplaintLifecycleManager::new(&self.store, &self.config, self.clock.as_ref(), self.sink.as_ref())
    }

    /// With `expected_version` set, the next transition only applies if
    /// nobody changed the complaint since the caller read that version.
    fn complaints_at(&self, expected_version: Option<i64>) -> ComplaintLifecycleManager<'_> {
        match expected_version {
            Some(v) => self.complaints().at_version(v),
            None => self.complaints(),
        }
    }

    fn ranking(&self) -> DeputyRankingRecalculator<'_> {
        DeputyRankingRecalculator::new(&self.store, self.clock.as_ref(), self.config.ranking_batch_size)
    }

    // ── Accounts & roles ───────────────────────────────────────────

    pub fn register_account(&self, display_name: &str) -> StandingResult<Account> {
        account_roles::register_account(&self.store, self.clock.as_ref(), display_name)
    }

    /// Grant the first administrator. Not reachable through an actor.
    pub fn bootstrap_admin(&self, account_id: &str) -> StandingResult<()> {
        account_roles::grant_admin(&self.store, self.clock.as_ref(), account_id)
    }

    pub fn has_role(&self, account_id: &str, role: Role) -> StandingResult<bool> {
        self.store.has_role(account_id, role)
    }

    pub fn roles_for(&self, account_id: &str) -> StandingResult<Vec<Role>> {
        self.store.roles_for(account_id)
    }

    pub fn promote_to_deputy(
        &self,
        actor:      &Actor,
        account_id: &str,
        status:     DeputyStatus,
    ) -> StandingResult<DeputyProfile> {
        authorize(&self.store, actor, Capability::ManageRoles)?;
        let profile = self.roles().promote_to_deputy(account_id, status)?;
        dispatch(
            self.sink.as_ref(),
            &StandingEvent::DeputyPromoted {
                account_id: profile.account_id.clone(),
                deputy_id:  profile.deputy_id.clone(),
                status:     profile.status,
            },
        );
        Ok(profile)
    }

    pub fn promote_to_manager(
        &self,
        actor:       &Actor,
        account_id:  &str,
        permissions: ManagerPermissions,
    ) -> StandingResult<ManagerGrant> {
        authorize(&self.store, actor, Capability::ManageRoles)?;
        let grant = self.roles().promote_to_manager(account_id, permissions)?;
        dispatch(
            self.sink.as_ref(),
            &StandingEvent::ManagerPromoted { account_id: grant.account_id.clone() },
        );
        Ok(grant)
    }

    pub fn update_manager_permissions(
        &self,
        actor:       &Actor,
        account_id:  &str,
        permissions: ManagerPermissions,
    ) -> StandingResult<ManagerGrant> {
        authorize(&self.store, actor, Capability::ManageRoles)?;
        self.roles().update_manager_permissions(account_id, permissions)
    }

    pub fn demote_manager(&self, actor: &Actor, account_id: &str) -> StandingResult<()> {
        authorize(&self.store, actor, Capability::ManageRoles)?;
        let event = self.roles().demote_manager(account_id)?;
        dispatch(self.sink.as_ref(), &event);
        Ok(())
    }

    pub fn update_deputy_details(
        &self,
        actor:      &Actor,
        deputy_id:  &str,
        status:     DeputyStatus,
        council_id: Option<&str>,
    ) -> StandingResult<DeputyProfile> {
        authorize(&self.store, actor, Capability::ManageRoles)?;
        self.roles().update_deputy_details(deputy_id, status, council_id)
    }

    pub fn deputy_profile(&self, deputy_id: &str) -> StandingResult<DeputyProfile> {
        self.store
            .get_deputy_profile(deputy_id)?
            .ok_or_else(|| StandingError::DeputyNotFound(deputy_id.to_string()))
    }

    pub fn deputy_profile_for_account(&self, account_id: &str) -> StandingResult<Option<DeputyProfile>> {
        self.store.deputy_profile_for_account(account_id)
    }

    // ── Reputation ─────────────────────────────────────────────────

    /// The actor rates `deputy_id` as themselves.
    pub fn submit_rating(
        &self,
        actor:     &Actor,
        deputy_id: &str,
        value:     i64,
    ) -> StandingResult<RatingSummary> {
        authorize(&self.store, actor, Capability::RateDeputies)?;
        self.reputation().submit_rating(&actor.account_id, deputy_id, value)
    }

    pub fn set_baseline(
        &self,
        actor:     &Actor,
        deputy_id: &str,
        average:   f64,
        count:     i64,
    ) -> StandingResult<RatingSummary> {
        authorize(&self.store, actor, Capability::SetBaseline)?;
        self.reputation().set_baseline(deputy_id, average, count)
    }

    pub fn rating_summary(&self, deputy_id: &str) -> StandingResult<RatingSummary> {
        self.reputation().rating_summary(deputy_id)
    }

    pub fn my_rating(&self, actor: &Actor, deputy_id: &str) -> StandingResult<Option<Rating>> {
        self.reputation().citizen_rating(&actor.account_id, deputy_id)
    }

    // ── Complaints ─────────────────────────────────────────────────

    pub fn file_complaint(&self, actor: &Actor, new: NewComplaint) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::FileComplaints)?;
        self.complaints().file_complaint(&actor.account_id, new)
    }

    // Every transition takes the `expected_version` the caller last read;
    // a stale one fails with `ConcurrentModification`.

    pub fn begin_review(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).begin_review(complaint_id)
    }

    /// Assign a waiting complaint, or re-route one that hit the decline
    /// limit.
    pub fn assign_complaint(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        deputy_id:        &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).assign(complaint_id, deputy_id)
    }

    pub fn deputy_accept(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        self.require_assigned_deputy(actor, complaint_id)?;
        self.complaints_at(expected_version).deputy_accept(complaint_id)
    }

    pub fn deputy_reject(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        reason:           &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        self.require_assigned_deputy(actor, complaint_id)?;
        self.complaints_at(expected_version).deputy_reject(complaint_id, reason)
    }

    pub fn hold_complaint(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        category:         &str,
        until:            Timestamp,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).hold(complaint_id, category, until)
    }

    pub fn release_hold(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).release_hold(complaint_id)
    }

    pub fn update_priority(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        priority:         &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).update_priority(complaint_id, priority)
    }

    pub fn resolve_complaint(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        points:           i64,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        self.require_assigned_deputy(actor, complaint_id)?;
        self.complaints_at(expected_version).resolve(complaint_id, points)
    }

    pub fn reject_complaint(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        reason:           &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        self.require_assigned_deputy(actor, complaint_id)?;
        self.complaints_at(expected_version).reject(complaint_id, reason)
    }

    pub fn close_complaint(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).close(complaint_id)
    }

    pub fn archive_complaint(
        &self,
        actor:            &Actor,
        complaint_id:     &str,
        expected_version: Option<i64>,
    ) -> StandingResult<Complaint> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints_at(expected_version).archive(complaint_id)
    }

    pub fn complaint(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.complaints().get(complaint_id)
    }

    pub fn complaint_history(&self, complaint_id: &str) -> StandingResult<Vec<HistoryEntry>> {
        self.complaints().history(complaint_id)
    }

    pub fn reassignment_pool(&self, actor: &Actor) -> StandingResult<Vec<Complaint>> {
        authorize(&self.store, actor, Capability::ManageComplaints)?;
        self.complaints().reassignment_pool()
    }

    /// Deputy-side operations: the actor must be the assigned deputy, or
    /// hold complaint management rights.
    fn require_assigned_deputy(&self, actor: &Actor, complaint_id: &str) -> StandingResult<()> {
        if authorize(&self.store, actor, Capability::ManageComplaints).is_ok() {
            return Ok(());
        }
        authorize(&self.store, actor, Capability::ActAsDeputy)?;
        let complaint = self.complaints().get(complaint_id)?;
        let own = self.store.deputy_profile_for_account(&actor.account_id)?;
        match (own, complaint.assigned_deputy_id) {
            (Some(profile), Some(assigned)) if profile.deputy_id == assigned => Ok(()),
            _ => Err(StandingError::PermissionDenied(format!(
                "account '{}' is not the deputy assigned to complaint '{complaint_id}'",
                actor.account_id
            ))),
        }
    }

    // ── Ranking ────────────────────────────────────────────────────

    /// Recompute ranks now instead of waiting for the schedule.
    pub fn recompute_ranks(&self, actor: &Actor) -> StandingResult<RankingReport> {
        authorize(&self.store, actor, Capability::ManageRoles)?;
        let report = self.ranking().recompute_ranks()?;
        dispatch(
            self.sink.as_ref(),
            &StandingEvent::RanksRecomputed { as_of: report.as_of, ranked: report.ranked },
        );
        Ok(report)
    }

    pub fn latest_ranking(&self) -> StandingResult<Option<RankingReport>> {
        self.ranking().latest_ranking()
    }

    pub fn leaderboard(&self) -> StandingResult<Vec<DeputyScore>> {
        self.ranking().leaderboard()
    }

    pub fn deputy_score(&self, deputy_id: &str) -> StandingResult<Option<DeputyScore>> {
        self.store.get_score(deputy_id)
    }
}
