// ABOUTME: SQLite database shared by the message archive and the session registry.
// ABOUTME: Opens (or creates) the file and ensures both tables exist.
use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared connection handle; every store clones this
pub type Db = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        sender TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
    CREATE TABLE IF NOT EXISTS sessions (
        user_id TEXT PRIMARY KEY,
        continuation_token TEXT NOT NULL,
        last_activity_at TEXT NOT NULL
    );
";

/// Open the database file, creating its directory and tables as needed
pub fn open(path: &Path) -> Result<Db> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
    init(conn)
}

/// In-memory database for tests and one-shot commands
pub fn open_in_memory() -> Result<Db> {
    init(Connection::open_in_memory().context("Failed to open in-memory database")?)
}

fn init(conn: Connection) -> Result<Db> {
    conn.execute_batch(SCHEMA)
        .context("Failed to create database tables")?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub(crate) fn lock(db: &Db) -> Result<MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|e| anyhow!("Database mutex poisoned: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jarvis.db");
        open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reopening_keeps_existing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jarvis.db");
        {
            let db = open(&path).unwrap();
            let conn = lock(&db).unwrap();
            conn.execute(
                "INSERT INTO messages (id, content, sender, created_at) VALUES ('m1', 'hi', 'u1', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }
        let db = open(&path).unwrap();
        let conn = lock(&db).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
