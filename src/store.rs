//! Pooled SQLite handle shared by the user and task stores.
//!
//! Each store call runs on Tokio's blocking pool with its own pooled
//! connection, so request handlers never block the async workers.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Busy timeout applied to every pooled connection (milliseconds).
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// How long a caller waits for a free pooled connection.
const CONNECTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// A unique column rejected the write. `field` names the column.
    #[error("{field} already exists.")]
    Duplicate { field: String },

    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

/// Parse a connection string.
///
/// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`, `sqlite:<path>`
/// and bare filesystem paths.
pub fn parse_database_url(url: &str) -> Result<DatabaseLocation, StoreError> {
    let url = url.trim();
    if url == "sqlite::memory:" || url == ":memory:" {
        return Ok(DatabaseLocation::Memory);
    }

    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if url.contains("://") {
        return Err(StoreError::UnsupportedUrl(url.to_string()));
    } else {
        url
    };

    if path.is_empty() {
        return Err(StoreError::UnsupportedUrl(url.to_string()));
    }
    Ok(DatabaseLocation::File(PathBuf::from(path)))
}

/// Cloneable handle to the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open the database and eagerly establish the pool.
    ///
    /// Fails if the database cannot be opened, which aborts startup.
    pub fn open(url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let location = parse_database_url(url)?;

        let builder =
            Pool::builder().connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS));
        let (manager, builder) = match location {
            // Every in-memory connection is its own database: keep exactly one alive forever.
            DatabaseLocation::Memory => (
                SqliteConnectionManager::memory(),
                builder.max_size(1).idle_timeout(None).max_lifetime(None),
            ),
            DatabaseLocation::File(path) => {
                // r2d2 retries failed connects until its timeout; probe once so a bad path fails fast.
                Connection::open(&path)?;
                (
                    SqliteConnectionManager::file(path),
                    builder.max_size(pool_size.max(1)),
                )
            }
        };

        let manager = manager.with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
            ))
        });

        let pool = builder.build(manager)?;
        Ok(Self { pool })
    }

    /// Run `sql` once on a pooled connection. Used for schema setup at startup.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run a blocking closure against a pooled connection on the blocking pool.
    pub async fn interact<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

/// Map a UNIQUE constraint failure to [`StoreError::Duplicate`].
///
/// SQLite reports the failing column as `UNIQUE constraint failed: <table>.<column>`.
pub(crate) fn map_unique_violation(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref message)) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            if let Some(columns) = message.strip_prefix("UNIQUE constraint failed: ") {
                let field = columns
                    .split(',')
                    .next()
                    .and_then(|col| col.trim().rsplit('.').next())
                    .unwrap_or("record")
                    .to_string();
                return StoreError::Duplicate { field };
            }
        }
    }
    StoreError::Sqlite(err)
}
