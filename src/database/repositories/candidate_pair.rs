use super::DatabaseError;
use crate::database::models::{CandidatePair, PairKey, CANDIDATE_PAIR_COLUMNS};
use chrono::Utc;
use rusqlite::{params, Connection};

/// Persistence for `similar_items`, one row per canonical pair key.
pub struct CandidatePairRepository<'c> {
    conn: &'c Connection,
}

impl<'c> CandidatePairRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert the pair, or raise its stored details score to `details_sim`
    /// if that is larger. The stored score never decreases.
    pub fn upsert_max(
        &self,
        key: &PairKey,
        reason: &str,
        details_sim: f64,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO similar_items (item_number1, item_number2, reason, details_highest_sim, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (item_number1, item_number2)
             DO UPDATE SET details_highest_sim = MAX(details_highest_sim, excluded.details_highest_sim)",
        )?;
        stmt.execute(params![key.first(), key.second(), reason, details_sim, now])?;
        Ok(())
    }

    pub fn find_all(&self) -> Result<Vec<CandidatePair>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM similar_items ORDER BY id",
            CANDIDATE_PAIR_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;
        let mut pairs = Vec::new();
        while let Some(row) = rows.next()? {
            pairs.push(CandidatePair::from_row(row)?);
        }
        Ok(pairs)
    }

    pub fn find_by_id(&self, id: i64) -> Result<CandidatePair, DatabaseError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM similar_items WHERE id = ?1",
            CANDIDATE_PAIR_COLUMNS
        ))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => CandidatePair::from_row(row),
            None => Err(DatabaseError::NotFound(format!("similar_items.id={}", id))),
        }
    }

    pub fn find_by_key(&self, key: &PairKey) -> Result<Option<CandidatePair>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM similar_items WHERE item_number1 = ?1 AND item_number2 = ?2",
            CANDIDATE_PAIR_COLUMNS
        ))?;
        let mut rows = stmt.query(params![key.first(), key.second()])?;
        match rows.next()? {
            Some(row) => Ok(Some(CandidatePair::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn update_image_similarity(&self, id: i64, images_sim: f64) -> Result<bool, DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE similar_items SET images_highest_sim = ?1 WHERE id = ?2",
            params![images_sim, id],
        )?;
        Ok(updated > 0)
    }

    pub fn update_identified(&self, id: i64, is_identified: bool) -> Result<bool, DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE similar_items SET is_identified = ?1 WHERE id = ?2",
            params![is_identified, id],
        )?;
        Ok(updated > 0)
    }

    pub fn count(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM similar_items", [], |row| row.get(0))?)
    }

    pub fn count_identified(&self) -> Result<i64, DatabaseError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM similar_items WHERE is_identified = 1",
            [],
            |row| row.get(0),
        )?)
    }
}
