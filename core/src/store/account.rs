use super::{is_unique_violation, parse_column, StandingStore};
use crate::{
    account_roles::Account,
    error::{StandingError, StandingResult},
    role_elevation::RoleGrant,
    types::{from_millis, to_millis, Role, Timestamp},
};
use rusqlite::{params, OptionalExtension};

/// A deputy/manager grant with no profile or permission row behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanGrant {
    pub account_id:   String,
    pub role:         Role,
    pub elevation_id: Option<String>,
    pub granted_at:   Timestamp,
}

impl StandingStore {
    // ── Account ────────────────────────────────────────────────────

    pub fn insert_account(&self, account: &Account) -> StandingResult<()> {
        self.conn.execute(
            "INSERT INTO account (account_id, display_name, created_at) VALUES (?1, ?2, ?3)",
            params![&account.account_id, &account.display_name, to_millis(account.created_at)],
        )?;
        Ok(())
    }

    pub fn get_account(&self, account_id: &str) -> StandingResult<Option<Account>> {
        let account = self
            .conn
            .query_row(
                "SELECT account_id, display_name, created_at FROM account WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(Account {
                        account_id:   row.get(0)?,
                        display_name: row.get(1)?,
                        created_at:   from_millis(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    pub fn account_exists(&self, account_id: &str) -> StandingResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM account WHERE account_id = ?1)",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ── Role grants ────────────────────────────────────────────────

    /// Insert a grant. A duplicate (account, role) pair, including one
    /// inserted by a concurrent caller, surfaces as `AlreadyElevated`.
    pub fn insert_role_grant(&self, grant: &RoleGrant) -> StandingResult<()> {
        let result = self.conn.execute(
            "INSERT INTO role_grant (account_id, role, elevation_id, granted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &grant.account_id,
                grant.role.as_str(),
                grant.elevation_id.as_deref(),
                to_millis(grant.granted_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StandingError::AlreadyElevated {
                account_id: grant.account_id.clone(),
                role:       grant.role,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a grant. With `elevation_id` set, only the grant written by
    /// that elevation is removed. Returns the number of rows deleted.
    pub fn delete_role_grant(
        &self,
        account_id:   &str,
        role:         Role,
        elevation_id: Option<&str>,
    ) -> StandingResult<usize> {
        let deleted = match elevation_id {
            Some(eid) => self.conn.execute(
                "DELETE FROM role_grant WHERE account_id = ?1 AND role = ?2 AND elevation_id = ?3",
                params![account_id, role.as_str(), eid],
            )?,
            None => self.conn.execute(
                "DELETE FROM role_grant WHERE account_id = ?1 AND role = ?2",
                params![account_id, role.as_str()],
            )?,
        };
        Ok(deleted)
    }

    pub fn has_role(&self, account_id: &str, role: Role) -> StandingResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM role_grant WHERE account_id = ?1 AND role = ?2)",
            params![account_id, role.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn roles_for(&self, account_id: &str) -> StandingResult<Vec<Role>> {
        let mut stmt = self.conn.prepare(
            "SELECT role FROM role_grant WHERE account_id = ?1 ORDER BY grant_id ASC",
        )?;
        let rows = stmt.query_map(params![account_id], |row| parse_column::<Role>(row, 0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Deputy/manager grants older than `granted_before` whose profile or
    /// permission row is missing.
    pub fn orphan_grants(&self, granted_before: Timestamp) -> StandingResult<Vec<OrphanGrant>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.account_id, g.role, g.elevation_id, g.granted_at
             FROM role_grant g
             WHERE g.granted_at < ?1 AND (
                 (g.role = 'deputy' AND NOT EXISTS (
                     SELECT 1 FROM deputy_profile p WHERE p.account_id = g.account_id))
              OR (g.role = 'manager' AND NOT EXISTS (
                     SELECT 1 FROM manager_permissions m WHERE m.account_id = g.account_id))
             )
             ORDER BY g.granted_at ASC, g.account_id ASC",
        )?;
        let rows = stmt.query_map(params![to_millis(granted_before)], |row| {
            Ok(OrphanGrant {
                account_id:   row.get(0)?,
                role:         parse_column(row, 1)?,
                elevation_id: row.get(2)?,
                granted_at:   from_millis(row.get(3)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
