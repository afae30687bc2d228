// Local session history store

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One finalized session as served by the history API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    pub timestamp: String,
    pub duration: String,
    pub result: String,
}

#[derive(Debug)]
pub struct HistoryDatabase {
    conn: Mutex<Connection>,
}

impl HistoryDatabase {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open history database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .context("Failed to set SQLite pragmas")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    duration TEXT NOT NULL,
                    result TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at DESC);",
            )
            .context("Failed to create history table")?;

        Ok(())
    }

    pub fn insert(&self, timestamp: &str, duration: &str, result: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO history (timestamp, duration, result, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![timestamp, duration, result, chrono::Utc::now().to_rfc3339()],
        )
        .context("Failed to insert history item")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> Result<Option<HistoryItem>> {
        let conn = self.conn.lock();
        let item = conn
            .query_row(
                "SELECT id, timestamp, duration, result FROM history WHERE id = ?1",
                params![id],
                |row| {
                    Ok(HistoryItem {
                        id: row.get(0)?,
                        timestamp: row.get(1)?,
                        duration: row.get(2)?,
                        result: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to get history item")?;
        Ok(item)
    }

    pub fn list(&self) -> Result<Vec<HistoryItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, duration, result FROM history ORDER BY id DESC",
        )?;

        let items = stmt
            .query_map([], |row| {
                Ok(HistoryItem {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    duration: row.get(2)?,
                    result: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list history items")?;

        Ok(items)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM history WHERE id = ?1", params![id])
            .context("Failed to delete history item")?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, HistoryDatabase) {
        let dir = TempDir::new().unwrap();
        let db = HistoryDatabase::new(dir.path().join("history.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn insert_get_roundtrip() {
        let (_dir, db) = open_temp();
        let id = db.insert("2024-03-05 14:30:07.123456", "30", "rest").unwrap();

        let item = db.get(id).unwrap().unwrap();
        assert_eq!(item.timestamp, "2024-03-05 14:30:07.123456");
        assert_eq!(item.duration, "30");
        assert_eq!(item.result, "rest");
    }

    #[test]
    fn get_unknown_id_is_none() {
        let (_dir, db) = open_temp();
        assert!(db.get(42).unwrap().is_none());
    }

    #[test]
    fn list_is_newest_first() {
        let (_dir, db) = open_temp();
        db.insert("t1", "30", "rest").unwrap();
        db.insert("t2", "30", "active").unwrap();

        let items = db.list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].timestamp, "t2");
        assert_eq!(items[1].timestamp, "t1");
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let (_dir, db) = open_temp();
        let id = db.insert("t1", "30", "rest").unwrap();
        assert!(db.delete(id).unwrap());
        assert!(!db.delete(id).unwrap());
        assert!(db.get(id).unwrap().is_none());
    }
}
