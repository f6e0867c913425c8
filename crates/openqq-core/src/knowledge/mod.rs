//! Healthcare-technology knowledge base.
//!
//! A small, closed set of records seeded once at first startup and read-only afterwards.
//! Lookup is literal substring containment, not a search index.

mod store;

pub use store::{KnowledgeRecord, KnowledgeStore, HEALTHCARE_TECH};

use crate::error::StorageError;

/// Read-only, substring-searchable record source.
pub trait KnowledgeSource: Send + Sync {
    /// Returns every record matching `query`, in a stable order (seed order).
    fn search(&self, query: &str) -> Result<Vec<KnowledgeRecord>, StorageError>;
}
