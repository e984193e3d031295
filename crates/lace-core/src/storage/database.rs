//! Connection ownership and schema migration.
//!
//! Mirrors `krusty-core`'s `Database` struct: a single owned connection behind
//! a mutex, created once at startup and handed to each store. On open
//! failure at the configured path, falls back to an in-memory SQLite
//! connection so the process can still run — durability is forfeit, but
//! correctness within the process lifetime is preserved (spec.md §4.1, §7).

use std::path::Path;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use crate::error::{StorageError, StorageResult};
use crate::model::Thread;

pub struct Database {
    conn: Mutex<Connection>,
    degraded: bool,
    /// Process-local cache of hydrated threads (spec.md §4.2). SQLite
    /// remains the cross-process authority; a miss here always falls
    /// through to a load that repopulates the entry.
    thread_cache: DashMap<String, Thread>,
}

impl Database {
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let (conn, degraded) = match Connection::open(path) {
            Ok(conn) => (conn, false),
            Err(err) => {
                tracing::error!(
                    path = %path.display(),
                    error = %err,
                    "failed to open database file, falling back to in-memory store; history will not survive restart"
                );
                let conn = Connection::open_in_memory().map_err(StorageError::Database)?;
                (conn, true)
            }
        };

        let db = Self {
            conn: Mutex::new(conn),
            degraded,
            thread_cache: DashMap::new(),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::Database)?;
        let db = Self {
            conn: Mutex::new(conn),
            degraded: false,
            thread_cache: DashMap::new(),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// The process-local hydrated-thread cache backing `ThreadStore`.
    pub(super) fn thread_cache(&self) -> &DashMap<String, Thread> {
        &self.thread_cache
    }

    /// Whether this database fell back to in-memory mode at open time.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Runs an arbitrary multi-step operation inside a single SQLite
    /// transaction (spec.md §4.1's `transaction(fn)`).
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StorageError::Database)?;
        let result = f(&tx)?;
        tx.commit().map_err(StorageError::Database)?;
        Ok(result)
    }

    fn migrate(&self) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                project_id TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id)
            );

            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                session_id TEXT,
                project_id TEXT,
                parent_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata TEXT,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );

            CREATE TABLE IF NOT EXISTS session_agents (
                session_id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                PRIMARY KEY (session_id, thread_id),
                FOREIGN KEY (session_id) REFERENCES sessions(id),
                FOREIGN KEY (thread_id) REFERENCES threads(id)
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                tag TEXT NOT NULL,
                call_id TEXT,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL,
                FOREIGN KEY (thread_id) REFERENCES threads(id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_thread_seq
                ON events (thread_id, sequence);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_approval_response_once
                ON events (thread_id, call_id)
                WHERE tag = 'TOOL_APPROVAL_RESPONSE';

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                prompt TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                priority TEXT NOT NULL DEFAULT 'medium',
                assignee TEXT NOT NULL,
                creator TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );

            CREATE TABLE IF NOT EXISTS task_notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id)
            );
            "#,
        )
        .map_err(StorageError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn opens_and_migrates_file_backed_db() {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::new(dir.path().join("lace.db")).expect("open db");
        assert!(!db.is_degraded());
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM threads", [], |r| r.get(0))
            .expect("query threads table");
        assert_eq!(count, 0);
    }

    #[test]
    fn degrades_to_memory_on_unwritable_path() {
        let db = Database::new("/nonexistent-directory-for-lace/lace.db").expect("degraded open");
        assert!(db.is_degraded());
    }
}
