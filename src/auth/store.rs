//! SQLite-backed credential store.
//!
//! Tables:
//! - `users`: id, username, email, password_hash, created_at

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::store::{map_unique_violation, Database, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    );";

/// A registered user as persisted.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Input for [`UserStore::insert`]. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Persistence seam for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Single lookup matching either `username` or `email`.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Find the user whose username OR email equals `login`.
    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    /// Persist a new user. Fails with [`StoreError::Duplicate`] on a unique clash.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

pub struct SqliteUserStore {
    db: Database,
}

impl SqliteUserStore {
    /// Wrap `db`, creating the `users` table if needed.
    pub fn new(db: Database) -> Result<Self, StoreError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
    })
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let username = username.to_string();
        let email = email.to_string();
        self.db
            .interact(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, username, email, password_hash
                         FROM users WHERE username = ?1 OR email = ?2
                         ORDER BY rowid LIMIT 1",
                        params![username, email],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.find_by_username_or_email(login, login).await
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
        };
        let created_at = Utc::now().trunc_subsecs(3);
        self.db
            .interact(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, email, password_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        user.id,
                        user.username,
                        user.email,
                        user.password_hash,
                        created_at
                    ],
                )
                .map_err(map_unique_violation)?;
                Ok(user)
            })
            .await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.db
            .interact(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(u64::try_from(count).unwrap_or_default())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteUserStore) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("todo.db");
        let db = Database::open(db_path.to_str().unwrap(), 2).unwrap();
        let store = SqliteUserStore::new(db).unwrap();
        (tmp, store)
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$pbkdf2-sha256$stub".into(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_either_field() {
        let (_tmp, store) = test_store();

        let user = store.insert(new_user("alice", "alice@x.com")).await.unwrap();
        assert!(!user.id.is_empty());

        let by_name = store.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        let by_email = store.find_by_login("alice@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(store.find_by_login("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lookup_matches_username_or_email() {
        let (_tmp, store) = test_store();
        store.insert(new_user("alice", "alice@x.com")).await.unwrap();

        let hit = store
            .find_by_username_or_email("someone", "alice@x.com")
            .await
            .unwrap();
        assert_eq!(hit.unwrap().username, "alice");

        let miss = store
            .find_by_username_or_email("someone", "someone@x.com")
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn duplicate_username_reports_field() {
        let (_tmp, store) = test_store();
        store.insert(new_user("alice", "alice@x.com")).await.unwrap();

        let err = store
            .insert(new_user("alice", "other@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "username"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_reports_field() {
        let (_tmp, store) = test_store();
        store.insert(new_user("alice", "alice@x.com")).await.unwrap();

        let err = store.insert(new_user("bob", "alice@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "email"));
    }

    #[tokio::test]
    async fn username_match_is_exact() {
        let (_tmp, store) = test_store();
        store.insert(new_user("alice", "alice@x.com")).await.unwrap();
        assert!(store.find_by_login("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_tracks_inserts() {
        let (_tmp, store) = test_store();
        assert_eq!(store.count().await.unwrap(), 0);
        store.insert(new_user("a", "a@x.com")).await.unwrap();
        store.insert(new_user("b", "b@x.com")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
