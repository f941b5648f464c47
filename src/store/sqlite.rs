//! SQLite-backed [`Store`].
//!
//! Table layout:
//! ```sql
//! CREATE TABLE IF NOT EXISTS configs (name TEXT PRIMARY KEY, value TEXT NOT NULL)
//! ```
//! Every call runs on the blocking pool; the connection is guarded by a mutex.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use super::Store;
use crate::error::StoreError;

const SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS configs (name TEXT PRIMARY KEY, value TEXT NOT NULL)";

/// Store backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| StoreError::Backend {
                reason: format!("blocking task failed: {e}"),
            })?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<String>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM configs WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn insert(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let (name, value) = (name.to_string(), value.to_string());
        self.with_conn(move |conn| {
            match conn.execute(
                "INSERT INTO configs (name, value) VALUES (?1, ?2)",
                params![name, value],
            ) {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate { name })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let (name, value) = (name.to_string(), value.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE configs SET value = ?2 WHERE name = ?1",
                params![name, value],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound { name });
            }
            Ok(())
        })
        .await
    }
}
