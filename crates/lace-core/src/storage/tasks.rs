//! Task and task-note persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{StorageError, StorageResult};
use crate::model::{Task, TaskNote, TaskPriority, TaskStatus};

use super::database::Database;

pub struct TaskStore<'a> {
    db: &'a Database,
}

impl<'a> TaskStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create_task(&self, task: &Task) -> StorageResult<()> {
        self.db
            .conn()
            .execute(
                "INSERT INTO tasks
                 (id, session_id, thread_id, title, description, prompt, status, priority, assignee, creator, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    task.id,
                    task.session_id,
                    task.thread_id,
                    task.title,
                    task.description,
                    task.prompt,
                    status_str(task.status),
                    priority_str(task.priority),
                    task.assignee,
                    task.creator,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .map_err(StorageError::Database)?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> StorageResult<Task> {
        let row = {
            let conn = self.db.conn();
            conn.query_row(
                "SELECT id, session_id, thread_id, title, description, prompt, status, priority, assignee, creator, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                [task_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                    ))
                },
            )
            .optional()
            .map_err(StorageError::Database)?
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))?
        };

        let (id, session_id, thread_id, title, description, prompt, status, priority, assignee, creator, created_at, updated_at) = row;
        let notes = self.list_notes(&id)?;

        Ok(Task {
            id,
            session_id,
            thread_id,
            title,
            description,
            prompt,
            status: parse_status(&status),
            priority: parse_priority(&priority),
            assignee,
            creator,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            notes,
        })
    }

    /// Lists tasks for a session, optionally filtered by status/priority/assignee.
    /// Filters are applied against the SQL row, conditionally included in the
    /// WHERE clause by `Option` rather than through a dynamic query builder.
    pub fn list_tasks(
        &self,
        session_id: &str,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
        assignee: Option<&str>,
    ) -> StorageResult<Vec<Task>> {
        let status_s = status.map(status_str);
        let priority_s = priority.map(priority_str);

        let ids: Vec<String> = {
            let conn = self.db.conn();
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM tasks
                     WHERE session_id = ?1
                       AND (?2 IS NULL OR status = ?2)
                       AND (?3 IS NULL OR priority = ?3)
                       AND (?4 IS NULL OR assignee = ?4)
                     ORDER BY created_at ASC",
                )
                .map_err(StorageError::Database)?;
            let rows = stmt
                .query_map(
                    params![session_id, status_s, priority_s, assignee],
                    |r| r.get::<_, String>(0),
                )
                .map_err(StorageError::Database)?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::Database)?
        };

        ids.into_iter().map(|id| self.get_task(&id)).collect()
    }

    pub fn update_task(
        &self,
        task_id: &str,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
        assignee: Option<&str>,
        description: Option<&str>,
    ) -> StorageResult<()> {
        let existing = self.get_task(task_id)?;
        let status = status.unwrap_or(existing.status);
        let priority = priority.unwrap_or(existing.priority);
        let assignee = assignee.unwrap_or(&existing.assignee);
        let description = description.unwrap_or(&existing.description);

        let affected = self
            .db
            .conn()
            .execute(
                "UPDATE tasks SET status = ?1, priority = ?2, assignee = ?3, description = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    status_str(status),
                    priority_str(priority),
                    assignee,
                    description,
                    Utc::now().to_rfc3339(),
                    task_id,
                ],
            )
            .map_err(StorageError::Database)?;
        if affected == 0 {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    pub fn delete_task(&self, task_id: &str) -> StorageResult<()> {
        self.db
            .conn()
            .execute("DELETE FROM task_notes WHERE task_id = ?1", [task_id])
            .map_err(StorageError::Database)?;
        let affected = self
            .db
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", [task_id])
            .map_err(StorageError::Database)?;
        if affected == 0 {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    pub fn add_note(&self, task_id: &str, note: &TaskNote) -> StorageResult<()> {
        self.db
            .conn()
            .execute(
                "INSERT INTO task_notes (task_id, author, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![task_id, note.author, note.content, note.timestamp.to_rfc3339()],
            )
            .map_err(StorageError::Database)?;
        self.db
            .conn()
            .execute(
                "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), task_id],
            )
            .map_err(StorageError::Database)?;
        Ok(())
    }

    fn list_notes(&self, task_id: &str) -> StorageResult<Vec<TaskNote>> {
        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(
                "SELECT author, content, timestamp FROM task_notes
                 WHERE task_id = ?1 ORDER BY id ASC",
            )
            .map_err(StorageError::Database)?;
        let notes = stmt
            .query_map([task_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(StorageError::Database)?
            .map(|r| {
                let (author, content, timestamp) = r.map_err(StorageError::Database)?;
                Ok(TaskNote {
                    author,
                    content,
                    timestamp: parse_ts(&timestamp),
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(notes)
    }
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Blocked => "blocked",
    }
}

fn parse_status(s: &str) -> TaskStatus {
    match s {
        "in_progress" => TaskStatus::InProgress,
        "completed" => TaskStatus::Completed,
        "blocked" => TaskStatus::Blocked,
        _ => TaskStatus::Pending,
    }
}

fn priority_str(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::High => "high",
        TaskPriority::Medium => "medium",
        TaskPriority::Low => "low",
    }
}

fn parse_priority(s: &str) -> TaskPriority {
    match s {
        "high" => TaskPriority::High,
        "low" => TaskPriority::Low,
        _ => TaskPriority::Medium,
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sessions::SessionStore;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn setup() -> (Database, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::new(dir.path().join("lace.db")).expect("open db");
        SessionStore::new(&db)
            .save_session(&crate::model::Session {
                id: "sess_1".into(),
                project_id: None,
                config: HashMap::new(),
                status: crate::model::SessionStatus::Active,
                agent_thread_ids: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .expect("save session");
        (db, dir)
    }

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.into(),
            title: "do the thing".into(),
            description: "".into(),
            prompt: "please do the thing".into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            assignee: "human".into(),
            creator: "human".into(),
            thread_id: "lace_20250731_aaa111".into(),
            session_id: "sess_1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            notes: vec![],
        }
    }

    #[test]
    fn create_update_and_note() {
        let (db, _dir) = setup();
        let store = TaskStore::new(&db);
        let task = sample_task("task_20250731_abc");
        store.create_task(&task).expect("create");

        store
            .update_task(&task.id, Some(TaskStatus::InProgress), None, None, None)
            .expect("update");
        let loaded = store.get_task(&task.id).expect("get");
        assert_eq!(loaded.status, TaskStatus::InProgress);

        store
            .add_note(
                &task.id,
                &TaskNote {
                    author: "human".into(),
                    content: "looks good".into(),
                    timestamp: Utc::now(),
                },
            )
            .expect("add note");
        let loaded = store.get_task(&task.id).expect("get");
        assert_eq!(loaded.notes.len(), 1);
    }

    #[test]
    fn list_filters_by_status() {
        let (db, _dir) = setup();
        let store = TaskStore::new(&db);
        let mut t1 = sample_task("task_20250731_one");
        t1.status = TaskStatus::Pending;
        let mut t2 = sample_task("task_20250731_two");
        t2.status = TaskStatus::Completed;
        store.create_task(&t1).expect("create t1");
        store.create_task(&t2).expect("create t2");

        let pending = store
            .list_tasks("sess_1", Some(TaskStatus::Pending), None, None)
            .expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, t1.id);
    }
}
