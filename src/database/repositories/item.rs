use super::DatabaseError;
use crate::database::models::{CrawledItem, NewCrawledItem, CRAWLED_ITEM_COLUMNS};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// Rows read by a bulk query. Rows that fail validation are counted in
/// `skipped` instead of failing the whole read.
#[derive(Debug, Clone, Default)]
pub struct LoadedItems {
    pub items: Vec<CrawledItem>,
    pub skipped: usize,
}

/// Reads listings produced by the crawler.
pub struct ItemRepository<'c> {
    conn: &'c Connection,
}

impl<'c> ItemRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, item: &NewCrawledItem) -> Result<CrawledItem, DatabaseError> {
        let images = serde_json::to_string(&item.images)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO crawled_items
             (item_number, seller_name, seller_id, title, description, category, price, images, downloaded, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            params![
                item.item_number,
                item.seller_name,
                item.seller_id,
                item.title,
                item.description,
                item.category,
                item.price,
                images,
                now,
            ],
        )?;

        self.find_by_item_number(&item.item_number)?
            .ok_or_else(|| DatabaseError::NotFound(format!("item {}", item.item_number)))
    }

    pub fn find_all(&self) -> Result<LoadedItems, DatabaseError> {
        self.query(
            &format!("SELECT {} FROM crawled_items ORDER BY id", CRAWLED_ITEM_COLUMNS),
            [],
        )
    }

    /// Items still waiting for the image fetcher.
    pub fn find_pending_download(&self) -> Result<LoadedItems, DatabaseError> {
        self.query(
            &format!(
                "SELECT {} FROM crawled_items WHERE downloaded = 0 ORDER BY id",
                CRAWLED_ITEM_COLUMNS
            ),
            [],
        )
    }

    pub fn find_by_item_number(
        &self,
        item_number: &str,
    ) -> Result<Option<CrawledItem>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM crawled_items WHERE item_number = ?1",
            CRAWLED_ITEM_COLUMNS
        ))?;
        let mut rows = stmt.query([item_number])?;
        match rows.next()? {
            Some(row) => Ok(Some(CrawledItem::from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn mark_downloaded(&self, id: i64) -> Result<bool, DatabaseError> {
        let updated = self
            .conn
            .execute("UPDATE crawled_items SET downloaded = 1 WHERE id = ?1", [id])?;
        Ok(updated > 0)
    }

    pub fn count(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM crawled_items", [], |row| row.get(0))?)
    }

    pub fn exists(&self, item_number: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM crawled_items WHERE item_number = ?1",
                [item_number],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn query<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<LoadedItems, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut loaded = LoadedItems::default();
        while let Some(row) = rows.next()? {
            match CrawledItem::from_row(row) {
                Ok(item) => loaded.items.push(item),
                Err(DatabaseError::InvalidRow(reason)) => {
                    log::warn!("Skipping crawled item: {}", reason);
                    loaded.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::Database;
    use tempfile::{tempdir, TempDir};

    pub(crate) fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = tempdir().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"));
        db.migrate().unwrap();
        (temp_dir, db)
    }

    pub(crate) fn listing(item_number: &str, title: &str, description: &str, category: &str) -> NewCrawledItem {
        NewCrawledItem {
            item_number: item_number.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            price: Some("S$10".to_string()),
            images: vec![format!("https://img.example/{}/1.jpg", item_number)],
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (_dir, db) = setup_test_db();
        let conn = db.session().unwrap();
        let repo = ItemRepository::new(&conn);

        let item = repo
            .insert(&listing("1001", "Nintendo Switch", "barely used", "Video Gaming"))
            .unwrap();
        assert_eq!(item.item_number, "1001");
        assert_eq!(item.images.len(), 1);
        assert!(!item.downloaded);

        assert!(repo.exists("1001").unwrap());
        assert!(!repo.exists("9999").unwrap());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_pending_download_and_mark() {
        let (_dir, db) = setup_test_db();
        let conn = db.session().unwrap();
        let repo = ItemRepository::new(&conn);

        let first = repo.insert(&listing("1", "a", "b", "c")).unwrap();
        repo.insert(&listing("2", "a", "b", "c")).unwrap();

        assert!(repo.mark_downloaded(first.id).unwrap());
        let pending = repo.find_pending_download().unwrap().items;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].item_number, "2");
        assert_eq!(repo.find_all().unwrap().items.len(), 2);
    }

    #[test]
    fn test_null_text_columns_read_as_empty() {
        let (_dir, db) = setup_test_db();
        let conn = db.session().unwrap();
        conn.execute(
            "INSERT INTO crawled_items (item_number, created_at) VALUES ('77', '2024-01-01')",
            [],
        )
        .unwrap();

        let item = ItemRepository::new(&conn)
            .find_by_item_number("77")
            .unwrap()
            .unwrap();
        assert_eq!(item.title, "");
        assert_eq!(item.description, "");
        assert!(item.images.is_empty());
    }

    #[test]
    fn test_invalid_rows_are_skipped_not_fatal() {
        let (_dir, db) = setup_test_db();
        let conn = db.session().unwrap();
        let repo = ItemRepository::new(&conn);
        repo.insert(&listing("1", "desk lamp", "white", "Furniture")).unwrap();
        conn.execute(
            "INSERT INTO crawled_items (item_number, images, created_at) VALUES ('5', '[broken', '2024-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO crawled_items (item_number, created_at) VALUES ('  ', '2024-01-01')",
            [],
        )
        .unwrap();

        let loaded = repo.find_all().unwrap();
        assert_eq!(loaded.skipped, 2);
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].item_number, "1");

        let pending = repo.find_pending_download().unwrap();
        assert_eq!(pending.items.len(), 1);
        assert_eq!(pending.skipped, 2);

        assert!(matches!(
            repo.find_by_item_number("5"),
            Err(DatabaseError::InvalidRow(_))
        ));
    }
}
