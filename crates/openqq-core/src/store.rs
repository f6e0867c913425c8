//! The single sled DB behind both tables: tree `cache` for the prompt cache and tree `tech`
//! for the knowledge base. Opening creates the directory and trees on first use.

use crate::cache::CacheStore;
use crate::error::StorageError;
use crate::knowledge::KnowledgeStore;
use std::path::Path;

/// Opens (or creates) the store at `path` and returns both table handles over the shared DB.
pub fn open_store<P: AsRef<Path>>(path: P) -> Result<(CacheStore, KnowledgeStore), StorageError> {
    let path = path.as_ref();
    let db = sled::open(path)?;
    tracing::info!(
        target: "openqq::store",
        path = %path.display(),
        recovered = db.was_recovered(),
        "store opened"
    );
    Ok((CacheStore::from_db(db.clone()), KnowledgeStore::from_db(db)))
}
