//! Complaint lifecycle: assignment, deputy response, holds, resolution.
//!
//! STATES:
//!   new → under_review → assigned → in_progress → {resolved | rejected} → closed
//!   assigned → reassigned → assigned      (deputy declined; new deputy)
//!   assigned → assigned                   (manual routing after the decline limit)
//!   closed → archived
//!
//! A hold is orthogonal to the status: it can be placed on or released
//! from any non-terminal complaint and only removes the complaint from the
//! automatic assignment pool until `hold_until`. Priority changes work the
//! same way: allowed on any non-terminal complaint, status untouched.
//!
//! RULES:
//!   - Every mutation runs in one write transaction: the status change,
//!     history row, score counters and event log entry commit together or
//!     not at all.
//!   - Every write is a compare-and-swap on `version`. A caller that read
//!     the complaint at an older version (see `at_version`) gets
//!     `ConcurrentModification` and must re-read.
//!   - An illegal source state fails with `InvalidTransition` before
//!     anything is written.

use crate::{
    clock::Clock,
    config::{StandingConfig, MAX_REASSIGNMENTS},
    error::{StandingError, StandingResult},
    event::{dispatch, NotificationSink, StandingEvent},
    store::StandingStore,
    types::{AccountId, ComplaintId, DeputyId, Timestamp, UnknownVariant},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    New,
    UnderReview,
    Assigned,
    InProgress,
    Reassigned,
    Resolved,
    Rejected,
    Closed,
    Archived,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::New         => "new",
            ComplaintStatus::UnderReview => "under_review",
            ComplaintStatus::Assigned    => "assigned",
            ComplaintStatus::InProgress  => "in_progress",
            ComplaintStatus::Reassigned  => "reassigned",
            ComplaintStatus::Resolved    => "resolved",
            ComplaintStatus::Rejected    => "rejected",
            ComplaintStatus::Closed      => "closed",
            ComplaintStatus::Archived    => "archived",
        }
    }

    /// Terminal complaints accept no holds, no priority changes and no
    /// work; only closing (and archiving once closed) remains.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ComplaintStatus::Resolved
                | ComplaintStatus::Rejected
                | ComplaintStatus::Closed
                | ComplaintStatus::Archived
        )
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new"          => Ok(ComplaintStatus::New),
            "under_review" => Ok(ComplaintStatus::UnderReview),
            "assigned"     => Ok(ComplaintStatus::Assigned),
            "in_progress"  => Ok(ComplaintStatus::InProgress),
            "reassigned"   => Ok(ComplaintStatus::Reassigned),
            "resolved"     => Ok(ComplaintStatus::Resolved),
            "rejected"     => Ok(ComplaintStatus::Rejected),
            "closed"       => Ok(ComplaintStatus::Closed),
            "archived"     => Ok(ComplaintStatus::Archived),
            other => Err(UnknownVariant { kind: "complaint status", value: other.to_string() }),
        }
    }
}

/// Everything that can be done to an existing complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintAction {
    BeginReview,
    Assign,
    DeputyAccept,
    DeputyReject,
    Hold,
    ReleaseHold,
    Resolve,
    Reject,
    Close,
    Archive,
    UpdatePriority,
}

impl ComplaintAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintAction::BeginReview    => "begin_review",
            ComplaintAction::Assign         => "assign",
            ComplaintAction::DeputyAccept   => "deputy_accept",
            ComplaintAction::DeputyReject   => "deputy_reject",
            ComplaintAction::Hold           => "hold",
            ComplaintAction::ReleaseHold    => "release_hold",
            ComplaintAction::Resolve        => "resolve",
            ComplaintAction::Reject         => "reject",
            ComplaintAction::Close          => "close",
            ComplaintAction::Archive        => "archive",
            ComplaintAction::UpdatePriority => "priority_changed",
        }
    }

    /// The transition table. `None` means the action is illegal from `from`.
    pub fn target(&self, from: ComplaintStatus) -> Option<ComplaintStatus> {
        use ComplaintStatus::*;
        match (*self, from) {
            (ComplaintAction::BeginReview, New) => Some(UnderReview),
            (ComplaintAction::Assign, New | UnderReview | Reassigned) => Some(Assigned),
            (ComplaintAction::DeputyAccept, Assigned) => Some(InProgress),
            (ComplaintAction::DeputyReject, Assigned) => Some(Reassigned),
            (ComplaintAction::Hold | ComplaintAction::ReleaseHold, s) if !s.is_terminal() => Some(s),
            (ComplaintAction::UpdatePriority, s) if !s.is_terminal() => Some(s),
            (ComplaintAction::Resolve, InProgress) => Some(Resolved),
            (ComplaintAction::Reject, InProgress) => Some(Rejected),
            (ComplaintAction::Close, Resolved | Rejected) => Some(Closed),
            (ComplaintAction::Archive, Closed) => Some(Archived),
            _ => None,
        }
    }

    /// `target` plus the one rule that depends on more than the status: a
    /// complaint left assigned by the decline limit can be routed by hand
    /// to another deputy.
    pub fn target_for(&self, complaint: &Complaint) -> Option<ComplaintStatus> {
        match (*self, complaint.status) {
            (ComplaintAction::Assign, ComplaintStatus::Assigned)
                if complaint.reassignment_count >= MAX_REASSIGNMENTS =>
            {
                Some(ComplaintStatus::Assigned)
            }
            (_, from) => self.target(from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub complaint_id:       ComplaintId,
    pub citizen_id:         AccountId,
    pub title:              String,
    pub description:        String,
    pub category:           String,
    pub priority:           String,
    pub status:             ComplaintStatus,
    pub assigned_deputy_id: Option<DeputyId>,
    pub assigned_at:        Option<Timestamp>,
    pub hold_count:         u32,
    pub hold_category:      Option<String>,
    pub hold_until:         Option<Timestamp>,
    pub reassignment_count: u32,
    pub points_awarded:     Option<i64>,
    pub rejection_reason:   Option<String>,
    pub created_at:         Timestamp,
    pub updated_at:         Timestamp,
    pub resolved_at:        Option<Timestamp>,
    pub closed_at:          Option<Timestamp>,
    pub version:            i64,
}

impl Complaint {
    pub fn is_held(&self, now: Timestamp) -> bool {
        self.hold_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComplaint {
    pub title:       String,
    pub description: String,
    pub category:    String,
    #[serde(default = "default_priority")]
    pub priority:    String,
}

fn default_priority() -> String {
    "medium".to_string()
}

/// One row of a complaint's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id:           Option<i64>,
    pub complaint_id: ComplaintId,
    pub action:       String,
    pub from:         ComplaintStatus,
    pub to:           ComplaintStatus,
    pub deputy_id:    Option<DeputyId>,
    pub reason:       Option<String>,
    pub occurred_at:  Timestamp,
}

/// What a mutation contributes to the history row.
#[derive(Debug, Default)]
struct StepNote {
    deputy_id: Option<DeputyId>,
    reason:    Option<String>,
}

#[derive(Clone, Copy)]
pub struct ComplaintLifecycleManager<'a> {
    store:            &'a StandingStore,
    config:           &'a StandingConfig,
    clock:            &'a dyn Clock,
    sink:             &'a dyn NotificationSink,
    expected_version: Option<i64>,
}

impl<'a> ComplaintLifecycleManager<'a> {
    pub fn new(
        store:  &'a StandingStore,
        config: &'a StandingConfig,
        clock:  &'a dyn Clock,
        sink:   &'a dyn NotificationSink,
    ) -> Self {
        Self { store, config, clock, sink, expected_version: None }
    }

    /// A manager whose next operation only applies if the complaint is
    /// still at `version`, the version the caller last read.
    pub fn at_version(&self, version: i64) -> Self {
        Self { expected_version: Some(version), ..*self }
    }

    // ── Creation & queries ─────────────────────────────────────────

    pub fn file_complaint(&self, citizen_id: &str, new: NewComplaint) -> StandingResult<Complaint> {
        if new.title.trim().is_empty() {
            return Err(StandingError::Validation("complaint title must not be empty".into()));
        }
        if new.description.trim().is_empty() {
            return Err(StandingError::Validation("complaint description must not be empty".into()));
        }
        if new.category.trim().is_empty() {
            return Err(StandingError::Validation("complaint category must not be empty".into()));
        }
        if !PRIORITIES.contains(&new.priority.as_str()) {
            return Err(StandingError::Validation(format!("unknown priority '{}'", new.priority)));
        }
        let now = self.clock.now();
        let complaint = Complaint {
            complaint_id:       uuid::Uuid::new_v4().to_string(),
            citizen_id:         citizen_id.to_string(),
            title:              new.title.trim().to_string(),
            description:        new.description,
            category:           new.category,
            priority:           new.priority,
            status:             ComplaintStatus::New,
            assigned_deputy_id: None,
            assigned_at:        None,
            hold_count:         0,
            hold_category:      None,
            hold_until:         None,
            reassignment_count: 0,
            points_awarded:     None,
            rejection_reason:   None,
            created_at:         now,
            updated_at:         now,
            resolved_at:        None,
            closed_at:          None,
            version:            0,
        };

        let tx = self.store.begin_write()?;
        if !self.store.account_exists(citizen_id)? {
            return Err(StandingError::AccountNotFound(citizen_id.to_string()));
        }
        self.store.insert_complaint(&complaint)?;
        self.store.insert_history(&HistoryEntry {
            id:           None,
            complaint_id: complaint.complaint_id.clone(),
            action:       "created".to_string(),
            from:         ComplaintStatus::New,
            to:           ComplaintStatus::New,
            deputy_id:    None,
            reason:       None,
            occurred_at:  now,
        })?;
        let event = StandingEvent::ComplaintFiled {
            complaint_id: complaint.complaint_id.clone(),
            citizen_id:   citizen_id.to_string(),
        };
        self.store.append_event("complaint", now, &event)?;
        tx.commit()?;

        log::debug!("complaint {} filed by {citizen_id}", complaint.complaint_id);
        dispatch(self.sink, &event);
        Ok(complaint)
    }

    pub fn get(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.store
            .get_complaint(complaint_id)?
            .ok_or_else(|| StandingError::ComplaintNotFound(complaint_id.to_string()))
    }

    pub fn history(&self, complaint_id: &str) -> StandingResult<Vec<HistoryEntry>> {
        self.store.complaint_history(complaint_id)
    }

    /// Complaints eligible for automatic (re)assignment: waiting for a
    /// deputy and not on hold.
    pub fn reassignment_pool(&self) -> StandingResult<Vec<Complaint>> {
        self.store.assignable_complaints(self.clock.now())
    }

    // ── Transitions ────────────────────────────────────────────────

    pub fn begin_review(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::BeginReview, |_, _| Ok(StepNote::default()))
    }

    pub fn assign(&self, complaint_id: &str, deputy_id: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::Assign, |c, now| {
            if !self.store.deputy_exists(deputy_id)? {
                return Err(StandingError::DeputyNotFound(deputy_id.to_string()));
            }
            c.assigned_deputy_id = Some(deputy_id.to_string());
            c.assigned_at = Some(now);
            self.store.record_assignment(deputy_id, now)?;
            Ok(StepNote { deputy_id: Some(deputy_id.to_string()), reason: None })
        })
    }

    pub fn deputy_accept(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::DeputyAccept, |c, _| {
            Ok(StepNote { deputy_id: c.assigned_deputy_id.clone(), reason: None })
        })
    }

    /// The assigned deputy declines. The complaint returns to the pool
    /// unless it has already been declined `MAX_REASSIGNMENTS` times, in
    /// which case it stays assigned and needs manual routing.
    pub fn deputy_reject(&self, complaint_id: &str, reason: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::DeputyReject, |c, now| {
            if c.reassignment_count >= MAX_REASSIGNMENTS {
                return Err(StandingError::ReassignmentLimitExceeded {
                    complaint_id: c.complaint_id.clone(),
                    limit:        MAX_REASSIGNMENTS,
                });
            }
            let declined_by = c.assigned_deputy_id.take();
            if let Some(deputy_id) = &declined_by {
                self.store.record_deputy_rejection(deputy_id, now)?;
            }
            c.assigned_at = None;
            c.reassignment_count += 1;
            c.rejection_reason = Some(reason.to_string());
            Ok(StepNote { deputy_id: declined_by, reason: Some(reason.to_string()) })
        })
    }

    pub fn hold(
        &self,
        complaint_id: &str,
        category:     &str,
        until:        Timestamp,
    ) -> StandingResult<Complaint> {
        if category.trim().is_empty() {
            return Err(StandingError::Validation("hold category must not be empty".into()));
        }
        let limit = self.config.hold_limit;
        self.apply(complaint_id, ComplaintAction::Hold, |c, now| {
            if until <= now {
                return Err(StandingError::Validation("hold must end in the future".into()));
            }
            if c.hold_count >= limit {
                return Err(StandingError::HoldLimitExceeded {
                    complaint_id: c.complaint_id.clone(),
                    limit,
                });
            }
            c.hold_count += 1;
            c.hold_until = Some(until);
            c.hold_category = Some(category.to_string());
            Ok(StepNote { deputy_id: None, reason: Some(category.to_string()) })
        })
    }

    pub fn release_hold(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::ReleaseHold, |c, now| {
            if !c.is_held(now) {
                return Err(StandingError::Conflict(format!(
                    "complaint '{}' is not on hold",
                    c.complaint_id
                )));
            }
            c.hold_until = None;
            c.hold_category = None;
            Ok(StepNote::default())
        })
    }

    /// Resolve and credit the assigned deputy: one more resolution,
    /// `points` more points, and the hours since filing folded into the
    /// deputy's running average.
    pub fn resolve(&self, complaint_id: &str, points: i64) -> StandingResult<Complaint> {
        if points < 0 {
            return Err(StandingError::Validation(format!(
                "points awarded must not be negative, got {points}"
            )));
        }
        self.apply(complaint_id, ComplaintAction::Resolve, |c, now| {
            let deputy_id = c.assigned_deputy_id.clone().ok_or_else(|| {
                StandingError::Conflict(format!("complaint '{}' has no assigned deputy", c.complaint_id))
            })?;
            let hours = (now - c.created_at).num_milliseconds().max(0) as f64 / 3_600_000.0;
            c.resolved_at = Some(now);
            c.points_awarded = Some(points);
            self.store.record_resolution(&deputy_id, points, hours, now)?;
            Ok(StepNote { deputy_id: Some(deputy_id), reason: None })
        })
    }

    pub fn reject(&self, complaint_id: &str, reason: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::Reject, |c, _| {
            c.rejection_reason = Some(reason.to_string());
            Ok(StepNote { deputy_id: c.assigned_deputy_id.clone(), reason: Some(reason.to_string()) })
        })
    }

    pub fn close(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::Close, |c, now| {
            c.closed_at = Some(now);
            Ok(StepNote::default())
        })
    }

    pub fn archive(&self, complaint_id: &str) -> StandingResult<Complaint> {
        self.apply(complaint_id, ComplaintAction::Archive, |_, _| Ok(StepNote::default()))
    }

    /// The history row records the change as `old -> new`.
    pub fn update_priority(&self, complaint_id: &str, priority: &str) -> StandingResult<Complaint> {
        if !PRIORITIES.contains(&priority) {
            return Err(StandingError::Validation(format!("unknown priority '{priority}'")));
        }
        self.apply(complaint_id, ComplaintAction::UpdatePriority, |c, _| {
            if c.priority == priority {
                return Err(StandingError::Conflict(format!(
                    "complaint '{}' already has priority '{priority}'",
                    c.complaint_id
                )));
            }
            let change = format!("{} -> {priority}", c.priority);
            c.priority = priority.to_string();
            Ok(StepNote { deputy_id: None, reason: Some(change) })
        })
    }

    /// Read, check, mutate, compare-and-swap, record. `mutate` runs inside
    /// the write transaction; any error it returns rolls everything back.
    fn apply<F>(
        &self,
        complaint_id: &str,
        action:       ComplaintAction,
        mutate:       F,
    ) -> StandingResult<Complaint>
    where
        F: FnOnce(&mut Complaint, Timestamp) -> StandingResult<StepNote>,
    {
        let now = self.clock.now();
        let tx = self.store.begin_write()?;

        let current = self
            .store
            .get_complaint(complaint_id)?
            .ok_or_else(|| StandingError::ComplaintNotFound(complaint_id.to_string()))?;
        if let Some(expected) = self.expected_version {
            if current.version != expected {
                return Err(StandingError::ConcurrentModification {
                    complaint_id:     complaint_id.to_string(),
                    expected_version: expected,
                });
            }
        }
        let from = current.status;
        let to = action.target_for(&current).ok_or_else(|| StandingError::InvalidTransition {
            from:      from.to_string(),
            attempted: action.as_str().to_string(),
        })?;

        let mut next = current.clone();
        next.status = to;
        next.updated_at = now;
        let note = mutate(&mut next, now)?;

        self.store.update_complaint_guarded(&next, current.version)?;
        next.version = current.version + 1;

        self.store.insert_history(&HistoryEntry {
            id:           None,
            complaint_id: complaint_id.to_string(),
            action:       action.as_str().to_string(),
            from,
            to,
            deputy_id:    note.deputy_id.clone(),
            reason:       note.reason,
            occurred_at:  now,
        })?;
        let event = match action {
            ComplaintAction::Hold => StandingEvent::ComplaintHeld {
                complaint_id: complaint_id.to_string(),
                category:     next.hold_category.clone().unwrap_or_default(),
                until:        next.hold_until.unwrap_or(now),
                hold_count:   next.hold_count,
            },
            ComplaintAction::ReleaseHold => StandingEvent::HoldReleased {
                complaint_id: complaint_id.to_string(),
            },
            ComplaintAction::UpdatePriority => StandingEvent::PriorityChanged {
                complaint_id: complaint_id.to_string(),
                from:         current.priority.clone(),
                to:           next.priority.clone(),
            },
            _ => StandingEvent::ComplaintTransitioned {
                complaint_id: complaint_id.to_string(),
                from,
                to,
                deputy_id: note.deputy_id,
            },
        };
        self.store.append_event("complaint", now, &event)?;
        tx.commit()?;

        log::debug!("complaint {complaint_id}: {} {from} -> {to}", action.as_str());
        dispatch(self.sink, &event);
        Ok(next)
    }
}
