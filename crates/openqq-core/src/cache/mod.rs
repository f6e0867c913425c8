//! Exact-match prompt cache.

mod store;

pub use store::CacheStore;

use crate::error::StorageError;

/// Durable prompt -> response map consulted before any other tier.
///
/// Keys are compared byte-for-byte: no trimming, case folding or unicode normalization.
pub trait PromptCache: Send + Sync {
    /// Returns the cached response for `prompt`, if any.
    fn get(&self, prompt: &str) -> Result<Option<String>, StorageError>;

    /// Stores `response` under `prompt`. An existing entry is overwritten (last write wins).
    /// Returns true when a previous value was replaced.
    fn put(&self, prompt: &str, response: &str) -> Result<bool, StorageError>;
}
