//! Store methods for citizen ratings.

use super::StandingStore;
use crate::{
    error::StandingResult,
    reputation::Rating,
    types::{from_millis, to_millis, Timestamp},
};
use rusqlite::{params, OptionalExtension};

impl StandingStore {
    /// Insert-or-update keyed on (citizen_id, deputy_id). One statement, so
    /// two concurrent submissions from the same citizen can never produce
    /// two rows.
    pub fn upsert_rating(
        &self,
        citizen_id: &str,
        deputy_id:  &str,
        value:      u8,
        now:        Timestamp,
    ) -> StandingResult<()> {
        self.conn.execute(
            "INSERT INTO rating (citizen_id, deputy_id, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (citizen_id, deputy_id)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![citizen_id, deputy_id, value as i64, to_millis(now)],
        )?;
        Ok(())
    }

    pub fn get_rating(&self, citizen_id: &str, deputy_id: &str) -> StandingResult<Option<Rating>> {
        let rating = self
            .conn
            .query_row(
                "SELECT citizen_id, deputy_id, value, created_at, updated_at
                 FROM rating WHERE citizen_id = ?1 AND deputy_id = ?2",
                params![citizen_id, deputy_id],
                |row| {
                    Ok(Rating {
                        citizen_id: row.get(0)?,
                        deputy_id:  row.get(1)?,
                        value:      row.get::<_, i64>(2)? as u8,
                        created_at: from_millis(row.get(3)?),
                        updated_at: from_millis(row.get(4)?),
                    })
                },
            )
            .optional()?;
        Ok(rating)
    }

    /// (count, sum of values) over every rating of `deputy_id`.
    pub fn rating_totals(&self, deputy_id: &str) -> StandingResult<(i64, i64)> {
        let totals = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(value), 0) FROM rating WHERE deputy_id = ?1",
            params![deputy_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(totals)
    }
}
