//! Project row persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{StorageError, StorageResult};
use crate::model::Project;

use super::database::Database;

pub struct ProjectStore<'a> {
    db: &'a Database,
}

impl<'a> ProjectStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn save_project(&self, project: &Project) -> StorageResult<()> {
        self.db
            .conn()
            .execute(
                "INSERT INTO projects (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    project.id,
                    project.name,
                    project.created_at.to_rfc3339(),
                    project.updated_at.to_rfc3339(),
                ],
            )
            .map_err(StorageError::Database)?;
        Ok(())
    }

    pub fn load_project(&self, project_id: &str) -> StorageResult<Project> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, name, created_at, updated_at FROM projects WHERE id = ?1",
                [project_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(StorageError::Database)?
            .ok_or_else(|| StorageError::ProjectNotFound(project_id.to_string()))?;

        let (id, name, created_at, updated_at) = row;
        Ok(Project {
            id,
            name,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    pub fn delete_project(&self, project_id: &str) -> StorageResult<()> {
        let affected = self
            .db
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", [project_id])
            .map_err(StorageError::Database)?;
        if affected == 0 {
            return Err(StorageError::ProjectNotFound(project_id.to_string()));
        }
        Ok(())
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
    use tempfile::TempDir;

    #[test]
    fn save_and_load_project() {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::new(dir.path().join("lace.db")).expect("open db");
        let store = ProjectStore::new(&db);
        let project = Project {
            id: "proj_1".into(),
            name: "demo".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.save_project(&project).expect("save");
        let loaded = store.load_project("proj_1").expect("load");
        assert_eq!(loaded.name, "demo");
    }
}
