use super::{schema, DatabaseError};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the sqlite file backing the three logical stores.
///
/// The handle itself holds no connection. Every caller that needs storage
/// asks for its own session, so worker tasks never share one.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh session against the database file.
    pub fn session(&self) -> Result<Connection, DatabaseError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn =
            Connection::open_with_flags(&self.path, flags).map_err(|source| {
                DatabaseError::Connection {
                    path: self.path.clone(),
                    source,
                }
            })?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets readers proceed while a worker holds the write lock
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;

        Ok(conn)
    }

    /// Create any missing tables. Safe to call on an already provisioned file.
    pub fn migrate(&self) -> Result<(), DatabaseError> {
        let conn = self.session()?;
        log::info!("Running DB migrations on {}", self.path.display());
        schema::run_migrations(&conn)?;
        log::info!("DB migrations completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_connection() {
        let temp_dir = tempdir().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"));

        let conn = db.session().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_migrate_is_repeatable() {
        let temp_dir = tempdir().unwrap();
        let db = Database::new(temp_dir.path().join("test.db"));

        db.migrate().unwrap();
        db.migrate().unwrap();

        let conn = db.session().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('crawled_items', 'similar_items', 'image_similarities')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_unreachable_path_is_connection_error() {
        let temp_dir = tempdir().unwrap();
        let db = Database::new(temp_dir.path().join("missing").join("dir").join("x.db"));

        match db.session() {
            Err(DatabaseError::Connection { path, .. }) => assert_eq!(path, db.path()),
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }
}
