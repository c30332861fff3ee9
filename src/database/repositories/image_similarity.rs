use super::DatabaseError;
use crate::database::models::ImageSimilarityRecord;
use chrono::Utc;
use rusqlite::{params, Connection};

/// Append-only sink for the exploratory image-vs-image log.
pub struct ImageSimilarityRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ImageSimilarityRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append every record. Callers wrap large batches in a transaction.
    pub fn append_batch(&self, records: &[ImageSimilarityRecord]) -> Result<usize, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO image_similarities (image_path1, image_path2, similarity, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        let mut written = 0;
        for record in records {
            written += stmt.execute(params![
                record.image_path1,
                record.image_path2,
                record.similarity,
                now
            ])?;
        }
        Ok(written)
    }

    pub fn find_all(&self) -> Result<Vec<ImageSimilarityRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT image_path1, image_path2, similarity FROM image_similarities ORDER BY id",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(ImageSimilarityRecord {
                    image_path1: row.get(0)?,
                    image_path2: row.get(1)?,
                    similarity: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM image_similarities", [], |row| {
                row.get(0)
            })?)
    }
}
