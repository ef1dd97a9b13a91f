//! Deputy score counters, rank assignment and ranking runs.

use super::StandingStore;
use crate::{
    error::StandingResult,
    ranking::{DeputyScore, RankingReport},
    types::{from_millis, to_millis, Timestamp},
};
use rusqlite::{params, OptionalExtension};

fn score_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeputyScore> {
    Ok(DeputyScore {
        deputy_id:                row.get(0)?,
        complaints_assigned:      row.get(1)?,
        complaints_resolved:      row.get(2)?,
        complaints_rejected:      row.get(3)?,
        total_points:             row.get(4)?,
        average_resolution_hours: row.get(5)?,
        rank:                     row.get(6)?,
        last_activity_at:         row.get::<_, Option<i64>>(7)?.map(from_millis),
    })
}

impl StandingStore {
    pub fn ensure_score_row(&self, deputy_id: &str) -> StandingResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO deputy_score (deputy_id) VALUES (?1)",
            params![deputy_id],
        )?;
        Ok(())
    }

    pub fn record_assignment(&self, deputy_id: &str, now: Timestamp) -> StandingResult<()> {
        self.ensure_score_row(deputy_id)?;
        self.conn.execute(
            "UPDATE deputy_score SET complaints_assigned = complaints_assigned + 1,
                last_activity_at = ?1
             WHERE deputy_id = ?2",
            params![to_millis(now), deputy_id],
        )?;
        Ok(())
    }

    pub fn record_deputy_rejection(&self, deputy_id: &str, now: Timestamp) -> StandingResult<()> {
        self.ensure_score_row(deputy_id)?;
        self.conn.execute(
            "UPDATE deputy_score SET complaints_rejected = complaints_rejected + 1,
                last_activity_at = ?1
             WHERE deputy_id = ?2",
            params![to_millis(now), deputy_id],
        )?;
        Ok(())
    }

    /// Count one more resolution and fold `hours` into the running mean.
    /// Must run inside the caller's write transaction.
    pub fn record_resolution(
        &self,
        deputy_id: &str,
        points:    i64,
        hours:     f64,
        now:       Timestamp,
    ) -> StandingResult<()> {
        self.ensure_score_row(deputy_id)?;
        self.conn.execute(
            "UPDATE deputy_score SET
                average_resolution_hours =
                    (COALESCE(average_resolution_hours, 0) * complaints_resolved + ?1)
                    / (complaints_resolved + 1),
                complaints_resolved = complaints_resolved + 1,
                total_points = total_points + ?2,
                last_activity_at = ?3
             WHERE deputy_id = ?4",
            params![hours, points, to_millis(now), deputy_id],
        )?;
        Ok(())
    }

    pub fn get_score(&self, deputy_id: &str) -> StandingResult<Option<DeputyScore>> {
        let score = self
            .conn
            .query_row(
                "SELECT deputy_id, complaints_assigned, complaints_resolved, complaints_rejected,
                        total_points, average_resolution_hours, rank, last_activity_at
                 FROM deputy_score WHERE deputy_id = ?1",
                params![deputy_id],
                score_row_mapper,
            )
            .optional()?;
        Ok(score)
    }

    pub fn all_scores(&self) -> StandingResult<Vec<DeputyScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT deputy_id, complaints_assigned, complaints_resolved, complaints_rejected,
                    total_points, average_resolution_hours, rank, last_activity_at
             FROM deputy_score ORDER BY deputy_id ASC",
        )?;
        let rows = stmt.query_map([], score_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn write_rank(&self, deputy_id: &str, rank: i64) -> StandingResult<()> {
        self.conn.execute(
            "UPDATE deputy_score SET rank = ?1 WHERE deputy_id = ?2",
            params![rank, deputy_id],
        )?;
        Ok(())
    }

    pub fn insert_ranking_run(&self, as_of: Timestamp, ranked: usize) -> StandingResult<()> {
        self.conn.execute(
            "INSERT INTO ranking_run (as_of, ranked) VALUES (?1, ?2)",
            params![to_millis(as_of), ranked as i64],
        )?;
        Ok(())
    }

    pub fn latest_ranking_run(&self) -> StandingResult<Option<RankingReport>> {
        let report = self
            .conn
            .query_row(
                "SELECT as_of, ranked FROM ranking_run ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RankingReport {
                        as_of:  from_millis(row.get(0)?),
                        ranked: row.get::<_, i64>(1)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(report)
    }
}
