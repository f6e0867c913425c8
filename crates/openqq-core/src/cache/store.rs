//! Sled-backed prompt cache (tree `cache`).

use super::PromptCache;
use crate::error::StorageError;
use sled::Db;
use std::path::Path;

const TREE_NAME: &str = "cache";

/// Prompt cache stored in the `cache` tree of the shared sled DB.
///
/// The tree handle is opened per operation and dropped on every exit path; only the `Db`
/// is held for the lifetime of the store.
#[derive(Clone)]
pub struct CacheStore {
    db: Db,
}

impl CacheStore {
    /// Opens or creates the store at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Wraps an already-open DB (shared with the knowledge base).
    pub fn from_db(db: Db) -> Self {
        Self { db }
    }

    /// Number of cached prompts.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.db.open_tree(TREE_NAME)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl PromptCache for CacheStore {
    fn get(&self, prompt: &str) -> Result<Option<String>, StorageError> {
        let tree = self.db.open_tree(TREE_NAME)?;
        let Some(bytes) = tree.get(prompt.as_bytes())? else {
            return Ok(None);
        };
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: prompt.to_string(),
                reason: e.to_string(),
            })
    }

    fn put(&self, prompt: &str, response: &str) -> Result<bool, StorageError> {
        let tree = self.db.open_tree(TREE_NAME)?;
        let prev = tree.insert(prompt.as_bytes(), response.as_bytes())?;
        tree.flush()?;

        let is_update = prev.is_some();
        tracing::info!(
            target: "openqq::cache",
            prompt_len = prompt.len(),
            bytes = response.len(),
            action = if is_update { "UPDATE" } else { "INSERT" },
            "cache {} ({} bytes)",
            if is_update { "updated" } else { "inserted" },
            response.len()
        );
        Ok(is_update)
    }
}
