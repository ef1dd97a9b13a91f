//! Capability checks at the service boundary.
//!
//! Authentication happens outside this crate; the caller arrives as an
//! `Actor` whose account id is trusted. What the actor may do is decided
//! here from their role grants.

use crate::{
    error::{StandingError, StandingResult},
    store::StandingStore,
    types::{AccountId, Role},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: AccountId,
}

impl Actor {
    pub fn new(account_id: impl Into<AccountId>) -> Self {
        Self { account_id: account_id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Promote, demote, edit deputy details, trigger ranking.
    ManageRoles,
    SetBaseline,
    /// Review, assign, hold, close complaints.
    ManageComplaints,
    RateDeputies,
    FileComplaints,
    /// Accept, decline and work on assigned complaints.
    ActAsDeputy,
}

impl Capability {
    /// Roles that carry this capability. Admin carries all of them.
    fn roles(&self) -> &'static [Role] {
        match self {
            Capability::ManageRoles | Capability::SetBaseline => &[Role::Admin],
            Capability::ManageComplaints => &[Role::Admin, Role::Manager],
            Capability::RateDeputies | Capability::FileComplaints => &[Role::Admin, Role::Citizen],
            Capability::ActAsDeputy => &[Role::Admin, Role::Deputy],
        }
    }
}

pub fn authorize(store: &StandingStore, actor: &Actor, capability: Capability) -> StandingResult<()> {
    for role in capability.roles() {
        if store.has_role(&actor.account_id, *role)? {
            return Ok(());
        }
    }
    log::debug!("denied {capability:?} to {}", actor.account_id);
    Err(StandingError::PermissionDenied(format!(
        "account '{}' lacks {capability:?}",
        actor.account_id
    )))
}
