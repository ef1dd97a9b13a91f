//! Domain events and the notification seam.
//!
//! Every successful state change emits one `StandingEvent`. The event is
//! appended to `event_log` in the same transaction as the change, then
//! handed to the `NotificationSink` after commit. Sinks are
//! fire-and-forget: a failing sink never undoes a committed change.

use crate::{
    complaint_lifecycle::ComplaintStatus,
    types::{AccountId, ComplaintId, DeputyId, DeputyStatus, Role, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StandingEvent {
    // ── Roles ──────────────────────────────────────
    DeputyPromoted {
        account_id: AccountId,
        deputy_id:  DeputyId,
        status:     DeputyStatus,
    },
    ManagerPromoted {
        account_id: AccountId,
    },
    ManagerDemoted {
        account_id: AccountId,
    },
    OrphanGrantRepaired {
        account_id:   AccountId,
        role:         Role,
        elevation_id: Option<String>,
    },

    // ── Reputation ─────────────────────────────────
    RatingSubmitted {
        citizen_id: AccountId,
        deputy_id:  DeputyId,
        value:      u8,
        average:    Option<f64>,
        count:      i64,
    },
    BaselineSet {
        deputy_id: DeputyId,
        average:   Option<f64>,
        count:     i64,
    },

    // ── Complaints ─────────────────────────────────
    ComplaintFiled {
        complaint_id: ComplaintId,
        citizen_id:   AccountId,
    },
    ComplaintTransitioned {
        complaint_id: ComplaintId,
        from:         ComplaintStatus,
        to:           ComplaintStatus,
        deputy_id:    Option<DeputyId>,
    },
    ComplaintHeld {
        complaint_id: ComplaintId,
        category:     String,
        until:        Timestamp,
        hold_count:   u32,
    },
    HoldReleased {
        complaint_id: ComplaintId,
    },

    // ── Ranking ────────────────────────────────────
    RanksRecomputed {
        as_of:  Timestamp,
        ranked: usize,
    },

    // ── Complaints (cont.) ─────────────────────────
    PriorityChanged {
        complaint_id: ComplaintId,
        from:         String,
        to:           String,
    },
}

impl StandingEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            StandingEvent::DeputyPromoted { .. }        => "deputy_promoted",
            StandingEvent::ManagerPromoted { .. }       => "manager_promoted",
            StandingEvent::ManagerDemoted { .. }        => "manager_demoted",
            StandingEvent::OrphanGrantRepaired { .. }   => "orphan_grant_repaired",
            StandingEvent::RatingSubmitted { .. }       => "rating_submitted",
            StandingEvent::BaselineSet { .. }           => "baseline_set",
            StandingEvent::ComplaintFiled { .. }        => "complaint_filed",
            StandingEvent::ComplaintTransitioned { .. } => "complaint_transitioned",
            StandingEvent::ComplaintHeld { .. }         => "complaint_held",
            StandingEvent::HoldReleased { .. }          => "hold_released",
            StandingEvent::RanksRecomputed { .. }       => "ranks_recomputed",
            StandingEvent::PriorityChanged { .. }       => "priority_changed",
        }
    }
}

/// A persisted `event_log` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub occurred_at: Timestamp,
    pub source:      String,
    pub event_type:  String,
    pub payload:     String,
}

/// Outbound notification channel (email, push, ...). Implementations
/// must not block on delivery.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &StandingEvent) -> anyhow::Result<()>;
}

/// Hand an event to the sink, logging and dropping any failure.
pub fn dispatch(sink: &dyn NotificationSink, event: &StandingEvent) {
    if let Err(e) = sink.notify(event) {
        log::warn!("notification for {} dropped: {e}", event.type_name());
    }
}

/// Writes every event to the log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &StandingEvent) -> anyhow::Result<()> {
        log::info!("notify {}: {}", event.type_name(), serde_json::to_string(event)?);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _event: &StandingEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
