//! SQLite task store.
//!
//! One table, three indexes, a single writer. All access goes through a
//! `Mutex<Connection>`: writes serialize, and reads are cheap enough at
//! this scale that a reader pool is not worth the machinery.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tm_domain::error::{Error, Result};
use tm_domain::task::{TaskPage, TaskQuery, TaskRecord, TaskStatus};

pub struct TaskStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    task_status TEXT NOT NULL,
    task_name TEXT NOT NULL,
    task_content TEXT NOT NULL,
    submit_time TIMESTAMP NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(task_status);
CREATE INDEX IF NOT EXISTS idx_tasks_submit_time ON tasks(submit_time);
CREATE INDEX IF NOT EXISTS idx_tasks_name ON tasks(task_name);
";

impl TaskStore {
    /// Open (or create) the store at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(sqlite_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(sqlite_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new task row. A duplicate id is an error, not an upsert.
    pub fn create(&self, task: &TaskRecord) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO tasks (task_id, task_status, task_name, task_content, submit_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    task.task_id,
                    task.task_status.as_str(),
                    task.task_name,
                    task.task_content,
                    task.submit_time.to_rfc3339(),
                ],
            )
            .map_err(sqlite_err)?;
        Ok(())
    }

    /// Update a task's status. Returns false when the id is unknown.
    pub fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<bool> {
        let affected = self
            .conn
            .lock()
            .execute(
                "UPDATE tasks SET task_status = ?1, updated_at = CURRENT_TIMESTAMP
                 WHERE task_id = ?2",
                params![status.as_str(), task_id],
            )
            .map_err(sqlite_err)?;
        Ok(affected > 0)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        self.conn
            .lock()
            .query_row(
                "SELECT task_id, task_status, task_name, task_content, submit_time
                 FROM tasks WHERE task_id = ?1",
                params![task_id],
                row_to_task,
            )
            .optional()
            .map_err(sqlite_err)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(sqlite_err)
    }

    /// Query tasks with pagination and optional status / name filters.
    /// Sorted by `submit_time DESC`; the name filter is a substring match.
    pub fn query(&self, query: &TaskQuery) -> Result<TaskPage> {
        let query = query.clone().normalized();

        let mut conditions: Vec<&str> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = query.status {
            conditions.push("task_status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if let Some(ref name) = query.task_name {
            conditions.push("task_name LIKE ?");
            params_vec.push(Box::new(format!("%{name}%")));
        }

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let conn = self.conn.lock();

        let count_sql = format!("SELECT COUNT(*) FROM tasks WHERE {where_clause}");
        let filter_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn
            .query_row(&count_sql, filter_refs.as_slice(), |row| row.get(0))
            .map_err(sqlite_err)?;

        let offset = (query.page - 1) * query.page_size;
        let select_sql = format!(
            "SELECT task_id, task_status, task_name, task_content, submit_time
             FROM tasks WHERE {where_clause}
             ORDER BY submit_time DESC
             LIMIT ? OFFSET ?"
        );
        params_vec.push(Box::new(query.page_size as i64));
        params_vec.push(Box::new(offset as i64));
        let select_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&select_sql).map_err(sqlite_err)?;
        let tasks = stmt
            .query_map(select_refs.as_slice(), row_to_task)
            .map_err(sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sqlite_err)?;

        Ok(TaskPage {
            total: total as u64,
            page: query.page,
            page_size: query.page_size,
            tasks,
        })
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status_str: String = row.get(1)?;
    let submit_str: String = row.get(4)?;
    Ok(TaskRecord {
        task_id: row.get(0)?,
        task_status: TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Failed),
        task_name: row.get(2)?,
        task_content: row.get(3)?,
        submit_time: DateTime::parse_from_rfc3339(&submit_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn sqlite_err(e: rusqlite::Error) -> Error {
    Error::Other(format!("sqlite: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(id: &str, status: TaskStatus, name: &str, age_hours: i64) -> TaskRecord {
        TaskRecord {
            task_id: id.into(),
            task_status: status,
            task_name: name.into(),
            task_content: format!("content of {name}"),
            submit_time: Utc::now() - Duration::hours(age_hours),
        }
    }

    fn seeded_store() -> TaskStore {
        let store = TaskStore::open_in_memory().unwrap();
        store.create(&task("t1", TaskStatus::Running, "data analysis", 1)).unwrap();
        store.create(&task("t2", TaskStatus::Success, "report generation", 2)).unwrap();
        store.create(&task("t3", TaskStatus::Failed, "mail delivery", 3)).unwrap();
        store.create(&task("t4", TaskStatus::Success, "data backup", 4)).unwrap();
        store
    }

    #[test]
    fn create_get_round_trip() {
        let store = TaskStore::open_in_memory().unwrap();
        let t = task("t1", TaskStatus::Running, "hello", 0);
        store.create(&t).unwrap();
        let loaded = store.get("t1").unwrap().unwrap();
        assert_eq!(loaded.task_name, "hello");
        assert_eq!(loaded.task_status, TaskStatus::Running);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let store = TaskStore::open_in_memory().unwrap();
        let t = task("t1", TaskStatus::Running, "a", 0);
        store.create(&t).unwrap();
        assert!(store.create(&t).is_err());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn update_status_transitions_the_row() {
        let store = TaskStore::open_in_memory().unwrap();
        store.create(&task("t1", TaskStatus::Running, "a", 0)).unwrap();
        assert!(store.update_status("t1", TaskStatus::Success).unwrap());
        assert_eq!(
            store.get("t1").unwrap().unwrap().task_status,
            TaskStatus::Success
        );
        assert!(!store.update_status("missing", TaskStatus::Failed).unwrap());
    }

    #[test]
    fn query_sorts_newest_first() {
        let store = seeded_store();
        let page = store
            .query(&TaskQuery {
                page: 1,
                page_size: 10,
                status: None,
                task_name: None,
            })
            .unwrap();
        assert_eq!(page.total, 4);
        let ids: Vec<_> = page.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn query_filters_by_status_and_name_substring() {
        let store = seeded_store();

        let page = store
            .query(&TaskQuery {
                page: 1,
                page_size: 10,
                status: Some(TaskStatus::Success),
                task_name: None,
            })
            .unwrap();
        assert_eq!(page.total, 2);

        let page = store
            .query(&TaskQuery {
                page: 1,
                page_size: 10,
                status: None,
                task_name: Some("data".into()),
            })
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page
            .tasks
            .iter()
            .all(|t| t.task_name.contains("data")));

        let page = store
            .query(&TaskQuery {
                page: 1,
                page_size: 10,
                status: Some(TaskStatus::Success),
                task_name: Some("data".into()),
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tasks[0].task_id, "t4");
    }

    #[test]
    fn query_paginates() {
        let store = seeded_store();
        let page = store
            .query(&TaskQuery {
                page: 2,
                page_size: 3,
                status: None,
                task_name: None,
            })
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].task_id, "t4");
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        {
            let store = TaskStore::open(&path).unwrap();
            store.create(&task("t1", TaskStatus::Running, "a", 0)).unwrap();
        }
        let store = TaskStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
