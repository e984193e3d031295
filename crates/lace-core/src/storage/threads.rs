//! Thread row persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;

use crate::error::{StorageError, StorageResult};
use crate::model::Thread;

use super::database::Database;
use super::events::EventStore;

pub struct ThreadStore<'a> {
    db: &'a Database,
}

impl<'a> ThreadStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn save_thread(&self, thread: &Thread) -> StorageResult<()> {
        let metadata_json = thread
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let parent_id = crate::ids::parent_of(&thread.id);

        self.db
            .conn()
            .execute(
                "INSERT INTO threads (id, session_id, project_id, parent_id, created_at, updated_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    thread.id,
                    thread.session_id,
                    thread.project_id,
                    parent_id,
                    thread.created_at.to_rfc3339(),
                    thread.updated_at.to_rfc3339(),
                    metadata_json,
                ],
            )
            .map_err(StorageError::Database)?;

        if let Some(session_id) = &thread.session_id {
            self.db
                .conn()
                .execute(
                    "INSERT OR IGNORE INTO session_agents (session_id, thread_id) VALUES (?1, ?2)",
                    params![session_id, thread.id],
                )
                .map_err(StorageError::Database)?;
        }
        self.db.thread_cache().insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    /// Mints a thread identifier and persists the thread (spec.md §4.2
    /// `createThread`). With `parent`, the id is `<parent>.<next integer>`
    /// and the delegate inherits the parent's session and project rather
    /// than `session_id`/`project_id`.
    pub fn create_thread(
        &self,
        parent: Option<&str>,
        session_id: Option<String>,
        project_id: Option<String>,
    ) -> StorageResult<Thread> {
        let now = Utc::now();
        let (id, session_id, project_id) = match parent {
            Some(parent_id) => {
                let parent_thread = self.load_thread(parent_id).map_err(|err| match err {
                    StorageError::ThreadNotFound(id) => StorageError::ParentThreadNotFound(id),
                    other => other,
                })?;
                let existing_children = self.child_count(parent_id)?;
                (
                    crate::ids::next_delegate_id(parent_id, existing_children),
                    parent_thread.session_id,
                    parent_thread.project_id,
                )
            }
            None => (crate::ids::new_thread_root_id(), session_id, project_id),
        };

        let thread = Thread {
            id,
            session_id,
            project_id,
            created_at: now,
            updated_at: now,
            metadata: None,
        };
        self.save_thread(&thread)?;
        Ok(thread)
    }

    pub fn load_thread(&self, thread_id: &str) -> StorageResult<Thread> {
        if let Some(cached) = self.db.thread_cache().get(thread_id) {
            return Ok(cached.clone());
        }

        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, session_id, project_id, created_at, updated_at, metadata
                 FROM threads WHERE id = ?1",
                [thread_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(StorageError::Database)?
            .ok_or_else(|| StorageError::ThreadNotFound(thread_id.to_string()))?;
        drop(conn);

        let (id, session_id, project_id, created_at, updated_at, metadata) = row;
        let metadata: Option<HashMap<String, serde_json::Value>> = metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()?;

        let thread = Thread {
            id,
            session_id,
            project_id,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            metadata,
        };
        self.db.thread_cache().insert(thread_id.to_string(), thread.clone());
        Ok(thread)
    }

    pub fn touch(&self, thread_id: &str) -> StorageResult<()> {
        let now = Utc::now();
        self.db
            .conn()
            .execute(
                "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), thread_id],
            )
            .map_err(StorageError::Database)?;
        if let Some(mut cached) = self.db.thread_cache().get_mut(thread_id) {
            cached.updated_at = now;
        }
        Ok(())
    }

    /// Count of direct children of `parent_id`, used to assign the next
    /// delegate suffix.
    pub fn child_count(&self, parent_id: &str) -> StorageResult<usize> {
        let count: i64 = self
            .db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM threads WHERE parent_id = ?1",
                [parent_id],
                |r| r.get(0),
            )
            .map_err(StorageError::Database)?;
        Ok(count as usize)
    }

    /// Deletes a thread and cascades its events.
    pub fn delete_thread(&self, thread_id: &str) -> StorageResult<()> {
        EventStore::new(self.db).delete_thread_events(thread_id)?;
        self.db
            .conn()
            .execute(
                "DELETE FROM session_agents WHERE thread_id = ?1",
                [thread_id],
            )
            .map_err(StorageError::Database)?;
        self.db
            .conn()
            .execute("DELETE FROM threads WHERE id = ?1", [thread_id])
            .map_err(StorageError::Database)?;
        self.db.thread_cache().remove(thread_id);
        Ok(())
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
