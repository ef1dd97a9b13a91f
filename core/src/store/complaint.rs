use super::{opt_millis, parse_column, StandingStore};
use crate::{
    complaint_lifecycle::{Complaint, ComplaintStatus, HistoryEntry},
    error::{StandingError, StandingResult},
    types::{from_millis, to_millis, Timestamp},
};
use rusqlite::{params, OptionalExtension};

const COMPLAINT_COLUMNS: &str = "complaint_id, citizen_id, title, description, category, priority,
    status, assigned_deputy_id, assigned_at, hold_count, hold_category, hold_until,
    reassignment_count, points_awarded, rejection_reason, created_at, updated_at,
    resolved_at, closed_at, version";

// Helper function for mapping complaint rows
fn complaint_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Complaint> {
    Ok(Complaint {
        complaint_id:       row.get(0)?,
        citizen_id:         row.get(1)?,
        title:              row.get(2)?,
        description:        row.get(3)?,
        category:           row.get(4)?,
        priority:           row.get(5)?,
        status:             parse_column(row, 6)?,
        assigned_deputy_id: row.get(7)?,
        assigned_at:        opt_millis(row.get(8)?),
        hold_count:         row.get::<_, i64>(9)? as u32,
        hold_category:      row.get(10)?,
        hold_until:         opt_millis(row.get(11)?),
        reassignment_count: row.get::<_, i64>(12)? as u32,
        points_awarded:     row.get(13)?,
        rejection_reason:   row.get(14)?,
        created_at:         from_millis(row.get(15)?),
        updated_at:         from_millis(row.get(16)?),
        resolved_at:        opt_millis(row.get(17)?),
        closed_at:          opt_millis(row.get(18)?),
        version:            row.get(19)?,
    })
}

impl StandingStore {
    // ── Complaint ──────────────────────────────────────────────────

    pub fn insert_complaint(&self, c: &Complaint) -> StandingResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO complaint ({COMPLAINT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
            ),
            params![
                &c.complaint_id,
                &c.citizen_id,
                &c.title,
                &c.description,
                &c.category,
                &c.priority,
                c.status.as_str(),
                c.assigned_deputy_id.as_deref(),
                c.assigned_at.map(to_millis),
                c.hold_count as i64,
                c.hold_category.as_deref(),
                c.hold_until.map(to_millis),
                c.reassignment_count as i64,
                c.points_awarded,
                c.rejection_reason.as_deref(),
                to_millis(c.created_at),
                to_millis(c.updated_at),
                c.resolved_at.map(to_millis),
                c.closed_at.map(to_millis),
                c.version,
            ],
        )?;
        Ok(())
    }

    pub fn get_complaint(&self, complaint_id: &str) -> StandingResult<Option<Complaint>> {
        let complaint = self
            .conn
            .query_row(
                &format!("SELECT {COMPLAINT_COLUMNS} FROM complaint WHERE complaint_id = ?1"),
                params![complaint_id],
                complaint_row_mapper,
            )
            .optional()?;
        Ok(complaint)
    }

    /// Compare-and-swap write of every mutable column. The row is written
    /// only if its version is still `expected_version`; the stored version
    /// becomes `expected_version + 1`.
    pub fn update_complaint_guarded(
        &self,
        c: &Complaint,
        expected_version: i64,
    ) -> StandingResult<()> {
        let updated = self.conn.execute(
            "UPDATE complaint SET
                status = ?1, assigned_deputy_id = ?2, assigned_at = ?3,
                hold_count = ?4, hold_category = ?5, hold_until = ?6,
                reassignment_count = ?7, points_awarded = ?8, rejection_reason = ?9,
                updated_at = ?10, resolved_at = ?11, closed_at = ?12,
                version = ?13 + 1
             WHERE complaint_id = ?14 AND version = ?13",
            params![
                c.status.as_str(),
                c.assigned_deputy_id.as_deref(),
                c.assigned_at.map(to_millis),
                c.hold_count as i64,
                c.hold_category.as_deref(),
                c.hold_until.map(to_millis),
                c.reassignment_count as i64,
                c.points_awarded,
                c.rejection_reason.as_deref(),
                to_millis(c.updated_at),
                c.resolved_at.map(to_millis),
                c.closed_at.map(to_millis),
                expected_version,
                &c.complaint_id,
            ],
        )?;
        if updated == 0 {
            if self.get_complaint(&c.complaint_id)?.is_none() {
                return Err(StandingError::ComplaintNotFound(c.complaint_id.clone()));
            }
            return Err(StandingError::ConcurrentModification {
                complaint_id: c.complaint_id.clone(),
                expected_version,
            });
        }
        Ok(())
    }

    /// Complaints waiting for a deputy that are not on hold at `now`,
    /// oldest first.
    pub fn assignable_complaints(&self, now: Timestamp) -> StandingResult<Vec<Complaint>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaint
             WHERE status IN ('new', 'under_review', 'reassigned')
               AND (hold_until IS NULL OR hold_until <= ?1)
             ORDER BY created_at ASC, complaint_id ASC"
        ))?;
        let rows = stmt.query_map(params![to_millis(now)], complaint_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn complaint_count_by_status(&self, status: ComplaintStatus) -> StandingResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM complaint WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── History ────────────────────────────────────────────────────

    pub fn insert_history(&self, entry: &HistoryEntry) -> StandingResult<()> {
        self.conn.execute(
            "INSERT INTO complaint_history (
                complaint_id, action, from_status, to_status, deputy_id, reason, occurred_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &entry.complaint_id,
                &entry.action,
                entry.from.as_str(),
                entry.to.as_str(),
                entry.deputy_id.as_deref(),
                entry.reason.as_deref(),
                to_millis(entry.occurred_at),
            ],
        )?;
        Ok(())
    }

    pub fn complaint_history(&self, complaint_id: &str) -> StandingResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, complaint_id, action, from_status, to_status, deputy_id, reason, occurred_at
             FROM complaint_history WHERE complaint_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![complaint_id], |row| {
            Ok(HistoryEntry {
                id:           Some(row.get(0)?),
                complaint_id: row.get(1)?,
                action:       row.get(2)?,
                from:         parse_column(row, 3)?,
                to:           parse_column(row, 4)?,
                deputy_id:    row.get(5)?,
                reason:       row.get(6)?,
                occurred_at:  from_millis(row.get(7)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
