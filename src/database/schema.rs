use super::DatabaseError;
use rusqlite::Connection;

const CRAWLED_ITEMS: &str = "
    CREATE TABLE IF NOT EXISTS crawled_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_number TEXT NOT NULL UNIQUE,
        seller_name TEXT,
        seller_id TEXT,
        title TEXT,
        description TEXT,
        category TEXT,
        price TEXT,
        images TEXT,
        downloaded INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_crawled_items_downloaded ON crawled_items(downloaded);
";

const SIMILAR_ITEMS: &str = "
    CREATE TABLE IF NOT EXISTS similar_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_number1 TEXT NOT NULL,
        item_number2 TEXT NOT NULL,
        reason TEXT NOT NULL,
        details_highest_sim REAL NOT NULL DEFAULT 0,
        images_highest_sim REAL,
        is_verified INTEGER NOT NULL DEFAULT 0,
        is_identified INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (item_number1, item_number2),
        CHECK (item_number1 < item_number2)
    );
";

const IMAGE_SIMILARITIES: &str = "
    CREATE TABLE IF NOT EXISTS image_similarities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        image_path1 TEXT NOT NULL,
        image_path2 TEXT NOT NULL,
        similarity REAL NOT NULL,
        created_at TEXT NOT NULL
    );
";

pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    for (table, ddl) in [
        ("crawled_items", CRAWLED_ITEMS),
        ("similar_items", SIMILAR_ITEMS),
        ("image_similarities", IMAGE_SIMILARITIES),
    ] {
        conn.execute_batch(ddl)
            .map_err(|e| DatabaseError::Migration(format!("{}: {}", table, e)))?;
    }
    Ok(())
}
