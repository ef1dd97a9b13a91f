//! Deputy profiles and manager permission rows.

use super::{is_unique_violation, parse_column, StandingStore};
use crate::{
    error::{StandingError, StandingResult},
    role_elevation::{DeputyProfile, ManagerGrant, ManagerPermissions},
    types::{from_millis, to_millis, DeputyStatus, Role},
};
use rusqlite::{params, OptionalExtension};

const PROFILE_COLUMNS: &str = "deputy_id, account_id, status, council_id, baseline_average,
    baseline_count, displayed_average, displayed_count, elevation_id, created_at";

fn profile_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeputyProfile> {
    Ok(DeputyProfile {
        deputy_id:         row.get(0)?,
        account_id:        row.get(1)?,
        status:            parse_column(row, 2)?,
        council_id:        row.get(3)?,
        baseline_average:  row.get(4)?,
        baseline_count:    row.get(5)?,
        displayed_average: row.get(6)?,
        displayed_count:   row.get(7)?,
        elevation_id:      row.get(8)?,
        created_at:        from_millis(row.get(9)?),
    })
}

fn manager_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ManagerGrant> {
    Ok(ManagerGrant {
        account_id: row.get(0)?,
        permissions: ManagerPermissions {
            can_manage_users:    row.get::<_, i32>(1)? != 0,
            can_manage_deputies: row.get::<_, i32>(2)? != 0,
            can_manage_content:  row.get::<_, i32>(3)? != 0,
            can_view_reports:    row.get::<_, i32>(4)? != 0,
            can_manage_settings: row.get::<_, i32>(5)? != 0,
        },
        elevation_id: row.get(6)?,
        created_at:   from_millis(row.get(7)?),
    })
}

impl StandingStore {
    // ── Deputy profile ─────────────────────────────────────────────

    /// Insert a profile. The UNIQUE(account_id) constraint is the last line
    /// against a double elevation; a violation maps to `AlreadyElevated`.
    pub fn insert_deputy_profile(&self, p: &DeputyProfile) -> StandingResult<()> {
        let result = self.conn.execute(
            "INSERT INTO deputy_profile (
                deputy_id, account_id, status, council_id, baseline_average,
                baseline_count, displayed_average, displayed_count, elevation_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &p.deputy_id,
                &p.account_id,
                p.status.as_str(),
                p.council_id.as_deref(),
                p.baseline_average,
                p.baseline_count,
                p.displayed_average,
                p.displayed_count,
                &p.elevation_id,
                to_millis(p.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StandingError::AlreadyElevated {
                account_id: p.account_id.clone(),
                role:       Role::Deputy,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_deputy_profile(&self, deputy_id: &str) -> StandingResult<Option<DeputyProfile>> {
        let profile = self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM deputy_profile WHERE deputy_id = ?1"),
                params![deputy_id],
                profile_row_mapper,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn deputy_profile_for_account(
        &self,
        account_id: &str,
    ) -> StandingResult<Option<DeputyProfile>> {
        let profile = self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM deputy_profile WHERE account_id = ?1"),
                params![account_id],
                profile_row_mapper,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn deputy_exists(&self, deputy_id: &str) -> StandingResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM deputy_profile WHERE deputy_id = ?1)",
            params![deputy_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn list_deputy_profiles(&self) -> StandingResult<Vec<DeputyProfile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM deputy_profile ORDER BY deputy_id ASC"
        ))?;
        let rows = stmt.query_map([], profile_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_deputy_details(
        &self,
        deputy_id:  &str,
        status:     DeputyStatus,
        council_id: Option<&str>,
    ) -> StandingResult<usize> {
        let updated = self.conn.execute(
            "UPDATE deputy_profile SET status = ?1, council_id = ?2 WHERE deputy_id = ?3",
            params![status.as_str(), council_id, deputy_id],
        )?;
        Ok(updated)
    }

    pub fn write_baseline(&self, deputy_id: &str, average: f64, count: i64) -> StandingResult<usize> {
        let updated = self.conn.execute(
            "UPDATE deputy_profile SET baseline_average = ?1, baseline_count = ?2
             WHERE deputy_id = ?3",
            params![average, count, deputy_id],
        )?;
        Ok(updated)
    }

    pub fn write_displayed_rating(
        &self,
        deputy_id: &str,
        average:   Option<f64>,
        count:     i64,
    ) -> StandingResult<()> {
        self.conn.execute(
            "UPDATE deputy_profile SET displayed_average = ?1, displayed_count = ?2
             WHERE deputy_id = ?3",
            params![average, count, deputy_id],
        )?;
        Ok(())
    }

    // ── Manager permissions ────────────────────────────────────────

    pub fn insert_manager_permissions(&self, grant: &ManagerGrant) -> StandingResult<()> {
        let p = &grant.permissions;
        let result = self.conn.execute(
            "INSERT INTO manager_permissions (
                account_id, can_manage_users, can_manage_deputies, can_manage_content,
                can_view_reports, can_manage_settings, elevation_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &grant.account_id,
                p.can_manage_users as i32,
                p.can_manage_deputies as i32,
                p.can_manage_content as i32,
                p.can_view_reports as i32,
                p.can_manage_settings as i32,
                &grant.elevation_id,
                to_millis(grant.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StandingError::AlreadyElevated {
                account_id: grant.account_id.clone(),
                role:       Role::Manager,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_manager_grant(&self, account_id: &str) -> StandingResult<Option<ManagerGrant>> {
        let grant = self
            .conn
            .query_row(
                "SELECT account_id, can_manage_users, can_manage_deputies, can_manage_content,
                        can_view_reports, can_manage_settings, elevation_id, created_at
                 FROM manager_permissions WHERE account_id = ?1",
                params![account_id],
                manager_row_mapper,
            )
            .optional()?;
        Ok(grant)
    }

    pub fn update_manager_permissions(
        &self,
        account_id:  &str,
        permissions: &ManagerPermissions,
    ) -> StandingResult<usize> {
        let updated = self.conn.execute(
            "UPDATE manager_permissions SET
                can_manage_users = ?1, can_manage_deputies = ?2, can_manage_content = ?3,
                can_view_reports = ?4, can_manage_settings = ?5
             WHERE account_id = ?6",
            params![
                permissions.can_manage_users as i32,
                permissions.can_manage_deputies as i32,
                permissions.can_manage_content as i32,
                permissions.can_view_reports as i32,
                permissions.can_manage_settings as i32,
                account_id,
            ],
        )?;
        Ok(updated)
    }

    pub fn delete_manager_permissions(&self, account_id: &str) -> StandingResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM manager_permissions WHERE account_id = ?1",
            params![account_id],
        )?;
        Ok(deleted)
    }
}
