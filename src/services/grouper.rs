use crate::core::text::text_similarity;
use crate::database::models::{CrawledItem, PairKey};
use crate::database::repositories::{CandidatePairRepository, ItemRepository};
use crate::database::{Database, DatabaseError};
use rayon::prelude::*;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

/// Category score above which the details score gets a bonus.
pub const CATEGORY_BONUS_THRESHOLD: f64 = 80.0;
pub const CATEGORY_BONUS: f64 = 5.0;
/// A pair is kept only when its details score is strictly above this.
pub const DETAILS_EMIT_THRESHOLD: f64 = 50.0;
/// Category score above which the reason names the category.
pub const CATEGORY_REASON_THRESHOLD: f64 = 50.0;

pub const REASON_CATEGORY: &str = "category_sim>50";
pub const REASON_TITLE_DESC: &str = "title_desc_sim>50";

/// Text scores of one unordered item pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairScores {
    pub key: PairKey,
    pub category_score: f64,
    pub title_score: f64,
    pub description_score: f64,
    pub details_score: f64,
    pub reason: &'static str,
}

impl PairScores {
    pub fn is_candidate(&self) -> bool {
        self.details_score > DETAILS_EMIT_THRESHOLD
    }
}

/// Merge field scores: best of title and description, plus a capped bonus
/// when the categories agree strongly.
pub fn details_score(title_score: f64, description_score: f64, category_score: f64) -> f64 {
    let details = title_score.max(description_score);
    if category_score > CATEGORY_BONUS_THRESHOLD {
        (details + CATEGORY_BONUS).min(100.0)
    } else {
        details
    }
}

pub fn reason_for(category_score: f64) -> &'static str {
    if category_score > CATEGORY_REASON_THRESHOLD {
        REASON_CATEGORY
    } else {
        REASON_TITLE_DESC
    }
}

/// Score one pair. The category is scored once and that value drives both
/// the bonus and the reason label.
pub fn score_pair(a: &CrawledItem, b: &CrawledItem) -> PairScores {
    let category_score = text_similarity(&a.category, &b.category);
    let title_score = text_similarity(&a.title, &b.title);
    let description_score = text_similarity(&a.description, &b.description);

    PairScores {
        key: PairKey::new(a.item_number.as_str(), b.item_number.as_str()),
        category_score,
        title_score,
        description_score,
        details_score: details_score(title_score, description_score, category_score),
        reason: reason_for(category_score),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TextPassReport {
    pub items: usize,
    /// Crawled rows left out because they failed validation.
    pub skipped_rows: usize,
    pub pairs_compared: usize,
    pub pairs_emitted: usize,
}

/// Result of grouping one snapshot of items, before anything is written.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub items: usize,
    pub pairs_compared: usize,
    pub candidates: Vec<PairScores>,
}

/// Phase 1: score every unordered item pair on text and keep the likely
/// duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemPairGrouper;

impl ItemPairGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Score every pair of distinct item numbers exactly once. Repeated item
    /// numbers keep their first occurrence. Candidates come back sorted by key.
    pub fn group(&self, items: &[CrawledItem]) -> Grouping {
        let mut seen = HashSet::new();
        let unique: Vec<&CrawledItem> = items
            .iter()
            .filter(|&item| {
                let fresh = seen.insert(item.item_number.as_str());
                if !fresh {
                    log::debug!("Duplicate item number {} ignored", item.item_number);
                }
                fresh
            })
            .collect();

        let n = unique.len();
        let mut candidates: Vec<PairScores> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| score_pair(unique[i], unique[j]))
            .filter(PairScores::is_candidate)
            .collect();
        candidates.sort_by(|a, b| a.key.cmp(&b.key));

        Grouping {
            items: n,
            pairs_compared: n * n.saturating_sub(1) / 2,
            candidates,
        }
    }

    /// Upsert all candidates in one transaction.
    pub fn persist(
        &self,
        conn: &mut Connection,
        candidates: &[PairScores],
    ) -> Result<usize, DatabaseError> {
        let tx = conn.transaction()?;
        {
            let repo = CandidatePairRepository::new(&tx);
            for pair in candidates {
                repo.upsert_max(&pair.key, pair.reason, pair.details_score)?;
            }
        }
        tx.commit()?;
        Ok(candidates.len())
    }

    /// Load every crawled item, group, and persist the candidates.
    pub fn run(&self, database: &Database) -> Result<TextPassReport, DatabaseError> {
        let mut conn = database.session()?;
        let loaded = ItemRepository::new(&conn).find_all()?;
        log::info!(
            "Text pass over {} items ({} invalid rows skipped)",
            loaded.items.len(),
            loaded.skipped
        );

        let grouping = self.group(&loaded.items);
        let emitted = self.persist(&mut conn, &grouping.candidates)?;

        log::info!(
            "Text pass done: {} pairs compared, {} candidates stored",
            grouping.pairs_compared,
            emitted
        );
        Ok(TextPassReport {
            items: grouping.items,
            skipped_rows: loaded.skipped,
            pairs_compared: grouping.pairs_compared,
            pairs_emitted: emitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::item::tests::{listing, setup_test_db};

    fn item(item_number: &str, title: &str, description: &str, category: &str) -> CrawledItem {
        CrawledItem {
            id: 0,
            item_number: item_number.to_string(),
            seller_name: None,
            seller_id: None,
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            price: None,
            images: Vec::new(),
            downloaded: true,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_category_bonus_is_capped() {
        assert_eq!(details_score(97.0, 40.0, 85.0), 100.0);
        assert_eq!(details_score(60.0, 70.0, 85.0), 75.0);
        // bonus needs strictly more than 80
        assert_eq!(details_score(60.0, 10.0, 80.0), 60.0);
    }

    #[test]
    fn test_emit_threshold_is_strict() {
        let mut scores = score_pair(
            &item("1", "red chair", "", ""),
            &item("2", "red chair", "", ""),
        );
        scores.details_score = 50.0;
        assert!(!scores.is_candidate());
        scores.details_score = 50.01;
        assert!(scores.is_candidate());
    }

    #[test]
    fn test_reason_uses_category_score() {
        let same_category = score_pair(
            &item("1", "iphone 13 pro", "", "Mobile Phones"),
            &item("2", "iphone 13 pro", "", "Mobile Phones"),
        );
        assert!((same_category.category_score - 100.0).abs() < 1e-9);
        assert_eq!(same_category.reason, REASON_CATEGORY);
        assert_eq!(same_category.details_score, 100.0);

        let other_category = score_pair(
            &item("1", "iphone 13 pro", "", "Mobile Phones"),
            &item("2", "iphone 13 pro", "", "Furniture"),
        );
        assert_eq!(other_category.category_score, 0.0);
        assert_eq!(other_category.reason, REASON_TITLE_DESC);
        assert_eq!(other_category.reason, reason_for(other_category.category_score));
    }

    #[test]
    fn test_group_scores_each_pair_once() {
        let items = vec![
            item("3", "wooden dining table", "solid oak", "Furniture"),
            item("1", "wooden dining table", "solid oak table", "Furniture"),
            item("2", "nintendo switch", "with two games", "Gaming"),
            item("1", "duplicate row", "ignored", "Furniture"),
        ];

        let grouping = ItemPairGrouper::new().group(&items);

        assert_eq!(grouping.items, 3);
        assert_eq!(grouping.pairs_compared, 3);
        assert_eq!(grouping.candidates.len(), 1);
        assert_eq!(grouping.candidates[0].key, PairKey::new("1", "3"));
        assert_eq!(grouping.candidates[0].reason, REASON_CATEGORY);
    }

    #[test]
    fn test_group_handles_tiny_inputs() {
        let grouper = ItemPairGrouper::new();
        assert_eq!(grouper.group(&[]).pairs_compared, 0);
        let one = grouper.group(&[item("1", "lamp", "", "")]);
        assert_eq!(one.pairs_compared, 0);
        assert!(one.candidates.is_empty());
    }

    #[test]
    fn test_run_is_idempotent() {
        let (_dir, db) = setup_test_db();
        {
            let conn = db.session().unwrap();
            let repo = ItemRepository::new(&conn);
            repo.insert(&listing("100", "ikea desk lamp", "white, barely used", "Furniture"))
                .unwrap();
            repo.insert(&listing("200", "ikea desk lamp", "white lamp", "Furniture"))
                .unwrap();
            repo.insert(&listing("300", "mechanical keyboard", "blue switches", "Computers"))
                .unwrap();
        }

        let grouper = ItemPairGrouper::new();
        let first = grouper.run(&db).unwrap();
        let second = grouper.run(&db).unwrap();

        assert_eq!(first.items, 3);
        assert_eq!(first.pairs_compared, 3);
        assert_eq!(first.pairs_emitted, 1);
        assert_eq!(second.pairs_emitted, 1);

        let conn = db.session().unwrap();
        let repo = CandidatePairRepository::new(&conn);
        assert_eq!(repo.count().unwrap(), 1);
        let stored = repo.find_by_key(&PairKey::new("200", "100")).unwrap().unwrap();
        assert_eq!(stored.reason, REASON_CATEGORY);
        assert_eq!(stored.details_highest_sim, 100.0);
        assert_eq!(stored.images_highest_sim, None);
    }

    #[test]
    fn test_run_skips_malformed_rows() {
        let (_dir, db) = setup_test_db();
        {
            let conn = db.session().unwrap();
            let repo = ItemRepository::new(&conn);
            repo.insert(&listing("100", "ikea desk lamp", "white", "Furniture"))
                .unwrap();
            repo.insert(&listing("200", "ikea desk lamp", "white", "Furniture"))
                .unwrap();
            conn.execute(
                "INSERT INTO crawled_items (item_number, title, images, created_at)
                 VALUES ('300', 'ikea desk lamp', '[broken', '2024-01-01')",
                [],
            )
            .unwrap();
        }

        let report = ItemPairGrouper::new().run(&db).unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.pairs_emitted, 1);

        let conn = db.session().unwrap();
        let repo = CandidatePairRepository::new(&conn);
        assert_eq!(repo.count().unwrap(), 1);
        let stored = repo.find_by_key(&PairKey::new("100", "200")).unwrap().unwrap();
        assert_eq!(stored.details_highest_sim, 100.0);
    }
}
