//! SQLite-backed task store. Every statement filters on the owner id.
//!
//! Tables:
//! - `tasks`: id, user_id, title, is_completed, priority, category, due_date,
//!   created_at, updated_at

use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

use super::{Priority, Task};
use crate::store::{Database, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        is_completed INTEGER NOT NULL DEFAULT 0,
        priority TEXT NOT NULL DEFAULT 'medium',
        category TEXT NOT NULL DEFAULT 'Other',
        due_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);";

const TASK_COLUMNS: &str =
    "id, user_id, title, is_completed, priority, category, due_date, created_at, updated_at";

/// Persistence seam for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Tasks owned by `owner` in creation order.
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError>;

    async fn insert(&self, task: Task) -> Result<Task, StoreError>;

    /// The task `id` if, and only if, `owner` owns it.
    async fn find_for_owner(&self, id: &str, owner: &str) -> Result<Option<Task>, StoreError>;

    /// Overwrite the mutable fields of `task` where id and owner match.
    /// Returns `None` when no row matched.
    async fn update_for_owner(&self, owner: &str, task: Task)
        -> Result<Option<Task>, StoreError>;

    /// Returns whether a row owned by `owner` was removed.
    async fn delete_for_owner(&self, id: &str, owner: &str) -> Result<bool, StoreError>;
}

pub struct SqliteTaskStore {
    db: Database,
}

impl SqliteTaskStore {
    /// Wrap `db`, creating the `tasks` table if needed.
    pub fn new(db: Database) -> Result<Self, StoreError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Priority::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown priority: {raw}").into()))
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        is_completed: row.get(3)?,
        priority: row.get(4)?,
        category: row.get(5)?,
        due_date: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let owner = owner.to_string();
        self.db
            .interact(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1
                     ORDER BY created_at, rowid"
                ))?;
                let tasks = stmt
                    .query_map(params![owner], task_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(tasks)
            })
            .await
    }

    async fn insert(&self, task: Task) -> Result<Task, StoreError> {
        self.db
            .interact(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO tasks ({TASK_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                    ),
                    params![
                        task.id,
                        task.user_id,
                        task.title,
                        task.is_completed,
                        task.priority,
                        task.category,
                        task.due_date,
                        task.created_at,
                        task.updated_at,
                    ],
                )?;
                Ok(task)
            })
            .await
    }

    async fn find_for_owner(&self, id: &str, owner: &str) -> Result<Option<Task>, StoreError> {
        let id = id.to_string();
        let owner = owner.to_string();
        self.db
            .interact(move |conn| {
                let task = conn
                    .query_row(
                        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
                        params![id, owner],
                        task_from_row,
                    )
                    .optional()?;
                Ok(task)
            })
            .await
    }

    async fn update_for_owner(
        &self,
        owner: &str,
        task: Task,
    ) -> Result<Option<Task>, StoreError> {
        let owner = owner.to_string();
        self.db
            .interact(move |conn| {
                let changed = conn.execute(
                    "UPDATE tasks
                     SET title = ?1, is_completed = ?2, priority = ?3, category = ?4,
                         due_date = ?5, updated_at = ?6
                     WHERE id = ?7 AND user_id = ?8",
                    params![
                        task.title,
                        task.is_completed,
                        task.priority,
                        task.category,
                        task.due_date,
                        task.updated_at,
                        task.id,
                        owner,
                    ],
                )?;
                Ok((changed > 0).then_some(task))
            })
            .await
    }

    async fn delete_for_owner(&self, id: &str, owner: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let owner = owner.to_string();
        self.db
            .interact(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
                    params![id, owner],
                )?;
                Ok(deleted > 0)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::tasks::{self, CreateTaskRequest, TaskPatch};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteTaskStore) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("todo.db");
        let db = Database::open(db_path.to_str().unwrap(), 2).unwrap();
        let store = SqliteTaskStore::new(db).unwrap();
        (tmp, store)
    }

    fn titled(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: Some(title.into()),
            ..CreateTaskRequest::default()
        }
    }

    fn body(json: &str) -> TaskPatch {
        TaskPatch::from_body(json.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn insert_round_trips_every_field() {
        let (_tmp, store) = test_store();
        let request = CreateTaskRequest {
            title: Some("File taxes".into()),
            priority: Some("high".into()),
            category: Some("Admin".into()),
            due_date: Some("2025-04-15".into()),
        };
        let created = tasks::create_task(&store, "alice", request).await.unwrap();

        let loaded = store
            .find_for_owner(&created.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.priority, Priority::High);
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner_in_creation_order() {
        let (_tmp, store) = test_store();
        let first = tasks::create_task(&store, "alice", titled("one")).await.unwrap();
        tasks::create_task(&store, "bob", titled("bob's")).await.unwrap();
        let second = tasks::create_task(&store, "alice", titled("two")).await.unwrap();

        let listed = tasks::list_tasks(&store, "alice").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

        assert!(tasks::list_tasks(&store, "carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_task_is_not_found_and_unchanged() {
        let (_tmp, store) = test_store();
        let task = tasks::create_task(&store, "alice", titled("private")).await.unwrap();

        let err = tasks::update_task(&store, "bob", &task.id, body(r#"{"title": "pwned"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let err = tasks::delete_task(&store, "bob", &task.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let still = store.find_for_owner(&task.id, "alice").await.unwrap().unwrap();
        assert_eq!(still, task);
    }

    #[tokio::test]
    async fn missing_and_foreign_ids_fail_identically() {
        let (_tmp, store) = test_store();
        let task = tasks::create_task(&store, "alice", titled("private")).await.unwrap();

        let foreign = tasks::delete_task(&store, "bob", &task.id).await.unwrap_err();
        let missing = tasks::delete_task(&store, "bob", "no-such-id").await.unwrap_err();
        assert_eq!(foreign.to_string(), missing.to_string());
        assert_eq!(foreign.status_code(), missing.status_code());
    }

    #[tokio::test]
    async fn update_persists_merged_fields() {
        let (_tmp, store) = test_store();
        let task = tasks::create_task(&store, "alice", titled("draft")).await.unwrap();

        let updated = tasks::update_task(
            &store,
            "alice",
            &task.id,
            body(r#"{"isCompleted": true, "category": "Work", "dueDate": "2025-06-01"}"#),
        )
        .await
        .unwrap();
        assert!(updated.is_completed);
        assert_eq!(updated.title, "draft");
        assert_eq!(updated.category, "Work");
        assert!(updated.updated_at >= task.updated_at);

        let loaded = store.find_for_owner(&task.id, "alice").await.unwrap().unwrap();
        assert_eq!(loaded, updated);
    }

    #[tokio::test]
    async fn empty_patch_toggles_persisted_state() {
        let (_tmp, store) = test_store();
        let task = tasks::create_task(&store, "alice", titled("flip")).await.unwrap();

        let once = tasks::update_task(&store, "alice", &task.id, TaskPatch::default())
            .await
            .unwrap();
        assert!(once.is_completed);
        let twice = tasks::update_task(&store, "alice", &task.id, TaskPatch::default())
            .await
            .unwrap();
        assert!(!twice.is_completed);
    }

    #[tokio::test]
    async fn delete_removes_only_owned_row() {
        let (_tmp, store) = test_store();
        let task = tasks::create_task(&store, "alice", titled("done")).await.unwrap();

        tasks::delete_task(&store, "alice", &task.id).await.unwrap();
        assert!(store.find_for_owner(&task.id, "alice").await.unwrap().is_none());

        let again = tasks::delete_task(&store, "alice", &task.id).await.unwrap_err();
        assert!(matches!(again, ApiError::NotFound));
    }

    #[tokio::test]
    async fn update_of_vanished_row_returns_none() {
        let (_tmp, store) = test_store();
        let task = tasks::create_task(&store, "alice", titled("gone")).await.unwrap();
        assert!(store.delete_for_owner(&task.id, "alice").await.unwrap());

        let result = store.update_for_owner("alice", task).await.unwrap();
        assert!(result.is_none());
    }
}
