use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::error::StoreError;

/// In-memory store backend.
///
/// Rows live as long as the store; used by tests and by stations without a
/// configured database file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `rows`.
    pub fn with_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            rows: RwLock::new(
                rows.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Copies every row, ordered by name.
    pub async fn dump(&self) -> Vec<(String, String)> {
        self.rows
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.rows.read().await.get(name).cloned())
    }

    async fn insert(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(name) {
            return Err(StoreError::Duplicate {
                name: name.to_string(),
            });
        }
        rows.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn update(&self, name: &str, value: &str) -> Result<(), StoreError> {
        match self.rows.write().await.get_mut(name) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}
