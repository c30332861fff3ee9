use crate::database::repositories::CandidatePairRepository;
use crate::database::DatabaseError;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

pub const DETAILS_SIM_THRESHOLD: f64 = 50.0;
pub const IMAGE_SIM_THRESHOLD: f64 = 50.0;

/// Both scores must be strictly above their thresholds.
pub fn is_identified(details_sim: f64, images_sim: f64) -> bool {
    details_sim > DETAILS_SIM_THRESHOLD && images_sim > IMAGE_SIM_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub pair_id: i64,
    pub details_sim: f64,
    pub images_sim: f64,
    pub is_identified: bool,
}

/// Final duplicate decision for a candidate pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairClassifier;

impl PairClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Store the visual score of `pair_id` and set its identified flag, as one
    /// unit. Only that pair's row is read or written.
    pub fn apply(
        &self,
        conn: &mut Connection,
        pair_id: i64,
        images_sim: f64,
    ) -> Result<Classification, DatabaseError> {
        // take the write lock up front so the re-read sees our own update
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let classification = {
            let repo = CandidatePairRepository::new(&tx);
            if !repo.update_image_similarity(pair_id, images_sim)? {
                return Err(DatabaseError::NotFound(format!(
                    "similar_items.id={}",
                    pair_id
                )));
            }

            let pair = repo.find_by_id(pair_id)?;
            let images_sim = pair.images_highest_sim.unwrap_or(images_sim);
            let identified = is_identified(pair.details_highest_sim, images_sim);
            repo.update_identified(pair_id, identified)?;

            Classification {
                pair_id,
                details_sim: pair.details_highest_sim,
                images_sim,
                is_identified: identified,
            }
        };
        tx.commit()?;

        log::debug!(
            "Pair {} classified: details={:.2}, images={:.2}, identified={}",
            pair_id,
            classification.details_sim,
            classification.images_sim,
            classification.is_identified
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::PairKey;
    use crate::database::repositories::item::tests::setup_test_db;

    fn seed_pair(conn: &Connection, a: &str, b: &str, details: f64) -> i64 {
        let repo = CandidatePairRepository::new(conn);
        repo.upsert_max(&PairKey::new(a, b), "title_desc_sim>50", details)
            .unwrap();
        repo.find_by_key(&PairKey::new(a, b)).unwrap().unwrap().id
    }

    #[test]
    fn test_thresholds_are_strict() {
        assert!(!is_identified(50.0, 90.0));
        assert!(!is_identified(90.0, 50.0));
        assert!(is_identified(50.5, 50.5));
    }

    #[test]
    fn test_boundary_details_score_is_not_identified() {
        let (_dir, db) = setup_test_db();
        let mut conn = db.session().unwrap();
        let id = seed_pair(&conn, "1", "2", 50.0);

        let classification = PairClassifier::new().apply(&mut conn, id, 90.0).unwrap();
        assert!(!classification.is_identified);

        let stored = CandidatePairRepository::new(&conn).find_by_id(id).unwrap();
        assert_eq!(stored.images_highest_sim, Some(90.0));
        assert!(!stored.is_identified);
    }

    #[test]
    fn test_both_scores_above_threshold_identifies() {
        let (_dir, db) = setup_test_db();
        let mut conn = db.session().unwrap();
        let id = seed_pair(&conn, "10", "20", 82.0);

        let classification = PairClassifier::new().apply(&mut conn, id, 64.0).unwrap();
        assert_eq!(
            classification,
            Classification {
                pair_id: id,
                details_sim: 82.0,
                images_sim: 64.0,
                is_identified: true,
            }
        );

        let stored = CandidatePairRepository::new(&conn).find_by_id(id).unwrap();
        assert!(stored.is_identified);
        assert!(!stored.is_verified);

        // a lower visual score on re-run clears the flag again
        PairClassifier::new().apply(&mut conn, id, 30.0).unwrap();
        let stored = CandidatePairRepository::new(&conn).find_by_id(id).unwrap();
        assert!(!stored.is_identified);
    }

    #[test]
    fn test_missing_pair_is_not_found() {
        let (_dir, db) = setup_test_db();
        let mut conn = db.session().unwrap();
        assert!(matches!(
            PairClassifier::new().apply(&mut conn, 999, 70.0),
            Err(DatabaseError::NotFound(_))
        ));
    }
}
