//! # Persistent store for entity values.
//!
//! A key-value table of `(name, value)` rows, both strings. The registry is its only
//! writer: it creates a row when a persisted entity is first registered, reads it back
//! on restart, and updates it on every authoritative change.
//!
//! - [`Store`] async trait implemented by backends
//! - [`MemoryStore`] ordered in-memory table
//! - [`SqliteStore`] SQLite file (feature `sqlite`)

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Shared handle to a store backend.
pub type StoreRef = Arc<dyn Store>;

/// Row-level access to the persistent key-value table.
///
/// ## Rules
/// - `insert` on an existing name fails with [`StoreError::Duplicate`].
/// - `update` on a missing name fails with [`StoreError::NotFound`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Returns the value stored under `name`, if any.
    async fn get_by_name(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Creates a new row.
    async fn insert(&self, name: &str, value: &str) -> Result<(), StoreError>;

    /// Replaces the value of an existing row.
    async fn update(&self, name: &str, value: &str) -> Result<(), StoreError>;
}

/// Updates `name`, creating the row when it does not exist yet.
pub(crate) async fn upsert(store: &dyn Store, name: &str, value: &str) -> Result<(), StoreError> {
    match store.update(name, value).await {
        Err(StoreError::NotFound { .. }) => store.insert(name, value).await,
        other => other,
    }
}
