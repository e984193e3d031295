//! Session row persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;

use crate::error::{StorageError, StorageResult};
use crate::model::{Session, SessionStatus};

use super::database::Database;
use super::threads::ThreadStore;

pub struct SessionStore<'a> {
    db: &'a Database,
}

impl<'a> SessionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn save_session(&self, session: &Session) -> StorageResult<()> {
        let config_json = serde_json::to_string(&session.config)?;
        self.db
            .conn()
            .execute(
                "INSERT INTO sessions (id, project_id, config, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.id,
                    session.project_id,
                    config_json,
                    status_str(session.status),
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )
            .map_err(StorageError::Database)?;
        Ok(())
    }

    pub fn load_session(&self, session_id: &str) -> StorageResult<Session> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, project_id, config, status, created_at, updated_at
                 FROM sessions WHERE id = ?1",
                [session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(StorageError::Database)?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))?;
        drop(conn);

        let (id, project_id, config, status, created_at, updated_at) = row;
        let config: HashMap<String, serde_json::Value> = serde_json::from_str(&config)?;
        let agent_thread_ids = self.agent_thread_ids(&id)?;

        Ok(Session {
            id,
            project_id,
            config,
            status: parse_status(&status),
            agent_thread_ids,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    pub fn update_session_status(&self, session_id: &str, status: SessionStatus) -> StorageResult<()> {
        let affected = self
            .db
            .conn()
            .execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_str(status), Utc::now().to_rfc3339(), session_id],
            )
            .map_err(StorageError::Database)?;
        if affected == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    pub fn agent_thread_ids(&self, session_id: &str) -> StorageResult<Vec<String>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare("SELECT thread_id FROM session_agents WHERE session_id = ?1")
            .map_err(StorageError::Database)?;
        let ids = stmt
            .query_map([session_id], |row| row.get::<_, String>(0))
            .map_err(StorageError::Database)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)?;
        Ok(ids)
    }

    /// Deletes a session and cascades its tasks and threads.
    pub fn delete_session(&self, session_id: &str) -> StorageResult<()> {
        let threads = self.agent_thread_ids(session_id)?;
        let thread_store = ThreadStore::new(self.db);
        for thread_id in threads {
            thread_store.delete_thread(&thread_id)?;
        }

        self.db
            .conn()
            .execute(
                "DELETE FROM task_notes WHERE task_id IN (SELECT id FROM tasks WHERE session_id = ?1)",
                [session_id],
            )
            .map_err(StorageError::Database)?;
        self.db
            .conn()
            .execute("DELETE FROM tasks WHERE session_id = ?1", [session_id])
            .map_err(StorageError::Database)?;
        self.db
            .conn()
            .execute(
                "DELETE FROM session_agents WHERE session_id = ?1",
                [session_id],
            )
            .map_err(StorageError::Database)?;
        self.db
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", [session_id])
            .map_err(StorageError::Database)?;
        Ok(())
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Archived => "archived",
        SessionStatus::Completed => "completed",
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "archived" => SessionStatus::Archived,
        "completed" => SessionStatus::Completed,
        _ => SessionStatus::Active,
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
