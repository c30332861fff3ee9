use super::DatabaseError;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

// Crawled listing, written by the crawler and read-only here (apart from `downloaded`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawledItem {
    pub id: i64,
    pub item_number: String,
    pub seller_name: Option<String>,
    pub seller_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Option<String>,
    pub images: Vec<String>,
    pub downloaded: bool,
    pub created_at: String,
}

pub(crate) const CRAWLED_ITEM_COLUMNS: &str = "id, item_number, seller_name, seller_id, title, \
     description, category, price, images, downloaded, created_at";

impl CrawledItem {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, DatabaseError> {
        let id: i64 = row.get("id")?;
        let item_number = required_text(row, "item_number", || format!("crawled_items.id={}", id))?;

        let images = match row.get::<_, Option<String>>("images")? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| {
                    DatabaseError::InvalidRow(format!(
                        "crawled_items.item_number={}: images is not a JSON string array: {}",
                        item_number, e
                    ))
                })?,
            _ => Vec::new(),
        };

        Ok(Self {
            id,
            item_number,
            seller_name: row.get("seller_name")?,
            seller_id: row.get("seller_id")?,
            title: row.get::<_, Option<String>>("title")?.unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("description")?
                .unwrap_or_default(),
            category: row.get::<_, Option<String>>("category")?.unwrap_or_default(),
            price: row.get("price")?,
            images,
            downloaded: row.get::<_, i64>("downloaded")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCrawledItem {
    pub item_number: String,
    pub seller_name: Option<String>,
    pub seller_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Option<String>,
    pub images: Vec<String>,
}

/// Canonical key of an unordered item pair.
///
/// Both orderings of the same two item numbers produce an equal key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

// Candidate pair row in `similar_items`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub id: i64,
    pub item_number1: String,
    pub item_number2: String,
    pub reason: String,
    pub details_highest_sim: f64,
    pub images_highest_sim: Option<f64>,
    pub is_identified: bool,
    pub is_verified: bool,
    pub created_at: String,
}

pub(crate) const CANDIDATE_PAIR_COLUMNS: &str = "id, item_number1, item_number2, reason, \
     details_highest_sim, images_highest_sim, is_identified, is_verified, created_at";

impl CandidatePair {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, DatabaseError> {
        let id: i64 = row.get("id")?;
        let context = || format!("similar_items.id={}", id);

        let item_number1 = required_text(row, "item_number1", context)?;
        let item_number2 = required_text(row, "item_number2", context)?;
        let details_highest_sim = row
            .get::<_, Option<f64>>("details_highest_sim")?
            .ok_or_else(|| {
                DatabaseError::InvalidRow(format!("{}: details_highest_sim is NULL", context()))
            })?;

        Ok(Self {
            id,
            item_number1,
            item_number2,
            reason: row.get::<_, Option<String>>("reason")?.unwrap_or_default(),
            details_highest_sim,
            images_highest_sim: row.get("images_highest_sim")?,
            is_identified: row.get::<_, i64>("is_identified")? != 0,
            is_verified: row.get::<_, i64>("is_verified")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.item_number1.clone(), self.item_number2.clone())
    }
}

// Append-only row of the exploratory image-vs-image log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSimilarityRecord {
    pub image_path1: String,
    pub image_path2: String,
    pub similarity: f64,
}

fn required_text(
    row: &Row<'_>,
    column: &str,
    context: impl Fn() -> String,
) -> Result<String, DatabaseError> {
    match row.get::<_, Option<String>>(column)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DatabaseError::InvalidRow(format!(
            "{}: {} is missing",
            context(),
            column
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = PairKey::new("200", "100");
        let b = PairKey::new("100", "200");
        assert_eq!(a, b);
        assert_eq!(a.first(), "100");
        assert_eq!(a.second(), "200");
        assert_eq!(a.to_string(), "(100, 200)");
    }
}
