//! Role elevation: turning an account into a deputy or a manager.
//!
//! Elevation writes two independently-constrained records, the role grant
//! and the profile (or permission row), as two separate statements:
//!
//!   1. insert RoleGrant(role)          UNIQUE(account_id, role)
//!   2. insert DeputyProfile / perms    UNIQUE(account_id)
//!      + event_log row                   (same transaction as the insert)
//!
//! If step 2 fails, step 1 is undone by a compensating delete of exactly
//! the grant this elevation wrote (matched on `elevation_id`). If the
//! compensation itself fails the grant is left behind as an orphan; the
//! reconciliation job (`reconciliation.rs`) sweeps those up.

use crate::{
    account_roles::AccountRoleStore,
    clock::Clock,
    error::{StandingError, StandingResult},
    event::StandingEvent,
    store::StandingStore,
    types::{AccountId, DeputyId, DeputyStatus, Role, Timestamp},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub account_id:   AccountId,
    pub role:         Role,
    /// Pairs a deputy/manager grant with the row created alongside it.
    pub elevation_id: Option<String>,
    pub granted_at:   Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeputyProfile {
    pub deputy_id:         DeputyId,
    pub account_id:        AccountId,
    pub status:            DeputyStatus,
    pub council_id:        Option<String>,
    pub baseline_average:  f64,
    pub baseline_count:    i64,
    /// `None` while there is nothing to average.
    pub displayed_average: Option<f64>,
    pub displayed_count:   i64,
    pub elevation_id:      String,
    pub created_at:        Timestamp,
}

/// Manager capabilities. Every flag starts false and is switched on
/// individually after promotion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerPermissions {
    pub can_manage_users:    bool,
    pub can_manage_deputies: bool,
    pub can_manage_content:  bool,
    pub can_view_reports:    bool,
    pub can_manage_settings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerGrant {
    pub account_id:   AccountId,
    pub permissions:  ManagerPermissions,
    pub elevation_id: String,
    pub created_at:   Timestamp,
}

pub struct RoleElevationService<'a, S: AccountRoleStore + ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: AccountRoleStore + ?Sized> RoleElevationService<'a, S> {
    pub fn new(store: &'a S, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Promote `account_id` to deputy with a zero baseline.
    pub fn promote_to_deputy(
        &self,
        account_id:     &str,
        initial_status: DeputyStatus,
    ) -> StandingResult<DeputyProfile> {
        self.check_preconditions(account_id, Role::Deputy)?;

        let now = self.clock.now();
        let elevation_id = uuid::Uuid::new_v4().to_string();
        self.store.insert_role_grant(&RoleGrant {
            account_id:   account_id.to_string(),
            role:         Role::Deputy,
            elevation_id: Some(elevation_id.clone()),
            granted_at:   now,
        })?;

        let profile = DeputyProfile {
            deputy_id:         uuid::Uuid::new_v4().to_string(),
            account_id:        account_id.to_string(),
            status:            initial_status,
            council_id:        None,
            baseline_average:  0.0,
            baseline_count:    0,
            displayed_average: None,
            displayed_count:   0,
            elevation_id:      elevation_id.clone(),
            created_at:        now,
        };
        if let Err(e) = self.store.insert_deputy_profile(&profile) {
            self.compensate(account_id, Role::Deputy, &elevation_id);
            return Err(e);
        }

        log::info!(
            "promoted {account_id} to deputy {} ({initial_status})",
            profile.deputy_id
        );
        Ok(profile)
    }

    /// Promote `account_id` to manager with the given permission flags.
    pub fn promote_to_manager(
        &self,
        account_id:  &str,
        permissions: ManagerPermissions,
    ) -> StandingResult<ManagerGrant> {
        self.check_preconditions(account_id, Role::Manager)?;

        let now = self.clock.now();
        let elevation_id = uuid::Uuid::new_v4().to_string();
        self.store.insert_role_grant(&RoleGrant {
            account_id:   account_id.to_string(),
            role:         Role::Manager,
            elevation_id: Some(elevation_id.clone()),
            granted_at:   now,
        })?;

        let grant = ManagerGrant {
            account_id: account_id.to_string(),
            permissions,
            elevation_id: elevation_id.clone(),
            created_at: now,
        };
        if let Err(e) = self.store.insert_manager_permissions(&grant) {
            self.compensate(account_id, Role::Manager, &elevation_id);
            return Err(e);
        }

        log::info!("promoted {account_id} to manager");
        Ok(grant)
    }

    fn check_preconditions(&self, account_id: &str, role: Role) -> StandingResult<()> {
        if !self.store.account_exists(account_id)? {
            return Err(StandingError::AccountNotFound(account_id.to_string()));
        }
        if self.store.has_role(account_id, role)? {
            return Err(StandingError::AlreadyElevated {
                account_id: account_id.to_string(),
                role,
            });
        }
        Ok(())
    }

    /// Best-effort undo of step 1. Never retried; a failure here leaves an
    /// orphan grant for the reconciliation sweep.
    fn compensate(&self, account_id: &str, role: Role, elevation_id: &str) {
        match self.store.delete_role_grant(account_id, role, elevation_id) {
            Ok(n) => log::warn!(
                "{role} elevation of {account_id} failed at profile insert; removed {n} grant(s)"
            ),
            Err(e) => log::error!(
                "{role} elevation of {account_id} failed and compensation failed too \
                 (elevation {elevation_id}): {e}"
            ),
        }
    }
}

impl RoleElevationService<'_, StandingStore> {
    /// Replace a manager's permission flags.
    pub fn update_manager_permissions(
        &self,
        account_id:  &str,
        permissions: ManagerPermissions,
    ) -> StandingResult<ManagerGrant> {
        if !self.store.account_exists(account_id)? {
            return Err(StandingError::AccountNotFound(account_id.to_string()));
        }
        let tx = self.store.begin_write()?;
        if !self.store.has_role(account_id, Role::Manager)?
            || self.store.update_manager_permissions(account_id, &permissions)? == 0
        {
            return Err(StandingError::Conflict(format!("account '{account_id}' is not a manager")));
        }
        let grant = self
            .store
            .get_manager_grant(account_id)?
            .ok_or_else(|| anyhow::anyhow!("manager permissions vanished for {account_id}"))?;
        tx.commit()?;
        log::debug!("updated manager permissions for {account_id}: {permissions:?}");
        Ok(grant)
    }

    /// Remove the manager role and its permissions, leaving the account a
    /// citizen. Returns the event already written to the log.
    pub fn demote_manager(&self, account_id: &str) -> StandingResult<StandingEvent> {
        if !self.store.account_exists(account_id)? {
            return Err(StandingError::AccountNotFound(account_id.to_string()));
        }
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        if !self.store.has_role(account_id, Role::Manager)? {
            return Err(StandingError::Conflict(format!("account '{account_id}' is not a manager")));
        }
        self.store.delete_manager_permissions(account_id)?;
        self.store.delete_role_grant(account_id, Role::Manager, None)?;
        if !self.store.has_role(account_id, Role::Citizen)? {
            self.store.insert_role_grant(&RoleGrant {
                account_id:   account_id.to_string(),
                role:         Role::Citizen,
                elevation_id: None,
                granted_at:   now,
            })?;
        }
        let event = StandingEvent::ManagerDemoted { account_id: account_id.to_string() };
        self.store.append_event("roles", now, &event)?;
        tx.commit()?;
        log::info!("demoted manager {account_id}");
        Ok(event)
    }

    /// Administrative edit of a deputy's public status and council.
    pub fn update_deputy_details(
        &self,
        deputy_id:  &str,
        status:     DeputyStatus,
        council_id: Option<&str>,
    ) -> StandingResult<DeputyProfile> {
        if self.store.update_deputy_details(deputy_id, status, council_id)? == 0 {
            return Err(StandingError::DeputyNotFound(deputy_id.to_string()));
        }
        self.store
            .get_deputy_profile(deputy_id)?
            .ok_or_else(|| StandingError::DeputyNotFound(deputy_id.to_string()))
    }
}
