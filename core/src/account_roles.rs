//! Account registration and the role-grant storage seam.
//!
//! Roles are a set of `role_grant` rows per account, never a single
//! mutable field, so one account can be citizen and deputy at once.
//! Authorization asks `has_role`, not "what is this account".

use crate::{
    clock::Clock,
    error::{StandingError, StandingResult},
    event::StandingEvent,
    role_elevation::{DeputyProfile, ManagerGrant, RoleGrant},
    store::StandingStore,
    types::{AccountId, Role, Timestamp},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id:   AccountId,
    pub display_name: String,
    pub created_at:   Timestamp,
}

/// Leaf data access used by role elevation. Each method commits on its
/// own; callers compose them. The profile and permission inserts finish
/// the elevation, so they also record its event in the same commit.
pub trait AccountRoleStore {
    fn account_exists(&self, account_id: &str) -> StandingResult<bool>;
    fn has_role(&self, account_id: &str, role: Role) -> StandingResult<bool>;
    fn insert_role_grant(&self, grant: &RoleGrant) -> StandingResult<()>;
    /// Remove the grant written by `elevation_id`. Returns rows removed.
    fn delete_role_grant(&self, account_id: &str, role: Role, elevation_id: &str)
        -> StandingResult<usize>;
    fn insert_deputy_profile(&self, profile: &DeputyProfile) -> StandingResult<()>;
    fn insert_manager_permissions(&self, grant: &ManagerGrant) -> StandingResult<()>;
}

impl AccountRoleStore for StandingStore {
    fn account_exists(&self, account_id: &str) -> StandingResult<bool> {
        StandingStore::account_exists(self, account_id)
    }

    fn has_role(&self, account_id: &str, role: Role) -> StandingResult<bool> {
        StandingStore::has_role(self, account_id, role)
    }

    fn insert_role_grant(&self, grant: &RoleGrant) -> StandingResult<()> {
        StandingStore::insert_role_grant(self, grant)
    }

    fn delete_role_grant(
        &self,
        account_id:   &str,
        role:         Role,
        elevation_id: &str,
    ) -> StandingResult<usize> {
        StandingStore::delete_role_grant(self, account_id, role, Some(elevation_id))
    }

    fn insert_deputy_profile(&self, profile: &DeputyProfile) -> StandingResult<()> {
        let tx = self.begin_write()?;
        StandingStore::insert_deputy_profile(self, profile)?;
        self.append_event("roles", profile.created_at, &StandingEvent::DeputyPromoted {
            account_id: profile.account_id.clone(),
            deputy_id:  profile.deputy_id.clone(),
            status:     profile.status,
        })?;
        tx.commit()?;
        Ok(())
    }

    fn insert_manager_permissions(&self, grant: &ManagerGrant) -> StandingResult<()> {
        let tx = self.begin_write()?;
        StandingStore::insert_manager_permissions(self, grant)?;
        self.append_event("roles", grant.created_at, &StandingEvent::ManagerPromoted {
            account_id: grant.account_id.clone(),
        })?;
        tx.commit()?;
        Ok(())
    }
}

/// Create an account holding the `citizen` role. Account and grant are
/// written in one transaction.
pub fn register_account(
    store:        &StandingStore,
    clock:        &dyn Clock,
    display_name: &str,
) -> StandingResult<Account> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(StandingError::Validation("display name must not be empty".into()));
    }
    let now = clock.now();
    let account = Account {
        account_id:   uuid::Uuid::new_v4().to_string(),
        display_name: display_name.to_string(),
        created_at:   now,
    };

    let tx = store.begin_write()?;
    store.insert_account(&account)?;
    store.insert_role_grant(&RoleGrant {
        account_id:   account.account_id.clone(),
        role:         Role::Citizen,
        elevation_id: None,
        granted_at:   now,
    })?;
    tx.commit()?;

    log::debug!("registered account {}", account.account_id);
    Ok(account)
}

/// Grant `admin` to an existing account. Bootstrap only: the first
/// administrator has nobody to promote them.
pub fn grant_admin(store: &StandingStore, clock: &dyn Clock, account_id: &str) -> StandingResult<()> {
    if !store.account_exists(account_id)? {
        return Err(StandingError::AccountNotFound(account_id.to_string()));
    }
    store.insert_role_grant(&RoleGrant {
        account_id:   account_id.to_string(),
        role:         Role::Admin,
        elevation_id: None,
        granted_at:   clock.now(),
    })?;
    log::info!("granted admin to {account_id}");
    Ok(())
}
