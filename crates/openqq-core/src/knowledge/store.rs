//! Sled-backed knowledge store (tree `tech`).
//!
//! Records are JSON-encoded under zero-padded sequence keys (`record/00000000000000000000`, ...) so that
//! sled's key-ordered iteration returns them in seed order.

use super::KnowledgeSource;
use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

const TREE_NAME: &str = "tech";
const KEY_PREFIX: &str = "record/";

/// A static topic entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub name: String,
    pub description: String,
    pub url: String,
}

impl KnowledgeRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
        }
    }

    /// True when `query` is a substring of the name or description, or when the query
    /// mentions the record by name ("What is OpenMRS?" -> OpenMRS). Case-sensitive.
    pub fn matches(&self, query: &str) -> bool {
        self.name.contains(query)
            || self.description.contains(query)
            || (!self.name.is_empty() && query.contains(self.name.as_str()))
    }

    /// `name: description`, the line format used in knowledge answers.
    pub fn summary_line(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }

    fn to_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(self).map_err(|e| StorageError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn from_bytes(key: &str, bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Built-in seed list installed on first startup.
pub const HEALTHCARE_TECH: [(&str, &str, &str); 3] = [
    ("OpenMRS", "Customizable EMR system.", "https://openmrs.org/"),
    (
        "OpenEMR",
        "Open-source EHR and practice management.",
        "https://www.open-emr.org/",
    ),
    (
        "GNU Health",
        "Health and hospital information system.",
        "https://www.gnuhealth.org/",
    ),
];

/// Knowledge records stored in the `tech` tree of the shared sled DB.
#[derive(Clone)]
pub struct KnowledgeStore {
    db: Db,
}

impl KnowledgeStore {
    /// Opens or creates the store at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Wraps an already-open DB (shared with the prompt cache).
    pub fn from_db(db: Db) -> Self {
        Self { db }
    }

    /// Padded to the width of `u64::MAX` so byte order equals numeric order.
    fn record_key(index: usize) -> String {
        format!("{}{:020}", KEY_PREFIX, index)
    }

    /// Installs `records` if the tree holds no records yet.
    /// Returns `Ok(true)` when it seeded, `Ok(false)` when records already existed.
    pub fn seed_if_empty(&self, records: &[KnowledgeRecord]) -> Result<bool, StorageError> {
        let tree = self.db.open_tree(TREE_NAME)?;
        if tree.scan_prefix(KEY_PREFIX).next().is_some() {
            tracing::debug!(target: "openqq::knowledge", "knowledge base already seeded");
            return Ok(false);
        }
        let mut batch = sled::Batch::default();
        for (i, record) in records.iter().enumerate() {
            let key = Self::record_key(i);
            batch.insert(key.as_bytes(), record.to_bytes(&key)?);
        }
        tree.apply_batch(batch)?;
        tree.flush()?;
        tracing::info!(
            target: "openqq::knowledge",
            records = records.len(),
            "knowledge base seeded with {} records",
            records.len()
        );
        Ok(true)
    }

    /// Seeds the built-in [`HEALTHCARE_TECH`] list if the store is empty.
    pub fn seed_defaults(&self) -> Result<bool, StorageError> {
        let records: Vec<KnowledgeRecord> = HEALTHCARE_TECH
            .iter()
            .map(|(name, description, url)| KnowledgeRecord::new(*name, *description, *url))
            .collect();
        self.seed_if_empty(&records)
    }

    /// All records in seed order.
    pub fn records(&self) -> Result<Vec<KnowledgeRecord>, StorageError> {
        let tree = self.db.open_tree(TREE_NAME)?;
        let mut out = Vec::new();
        for item in tree.scan_prefix(KEY_PREFIX) {
            let (k, v) = item?;
            let key = String::from_utf8_lossy(&k).into_owned();
            out.push(KnowledgeRecord::from_bytes(&key, &v)?);
        }
        Ok(out)
    }

    /// Number of records.
    pub fn len(&self) -> Result<usize, StorageError> {
        let tree = self.db.open_tree(TREE_NAME)?;
        Ok(tree.scan_prefix(KEY_PREFIX).count())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl KnowledgeSource for KnowledgeStore {
    fn search(&self, query: &str) -> Result<Vec<KnowledgeRecord>, StorageError> {
        let hits: Vec<KnowledgeRecord> = self
            .records()?
            .into_iter()
            .filter(|r| r.matches(query))
            .collect();
        tracing::debug!(
            target: "openqq::knowledge",
            hits = hits.len(),
            "knowledge search returned {} records",
            hits.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, KnowledgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path().join("store")).unwrap();
        assert!(store.seed_defaults().unwrap());
        (dir, store)
    }

    #[test]
    fn seeds_once() {
        let (_dir, store) = seeded_store();
        assert_eq!(store.len().unwrap(), 3);
        assert!(!store.seed_defaults().unwrap());
        assert!(!store
            .seed_if_empty(&[KnowledgeRecord::new("X", "Y", "Z")])
            .unwrap());
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn records_keep_seed_order() {
        let (_dir, store) = seeded_store();
        let names: Vec<String> = store.records().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["OpenMRS", "OpenEMR", "GNU Health"]);
    }

    #[test]
    fn search_matches_name_and_description_substrings() {
        let (_dir, store) = seeded_store();
        let hits = store.search("Open").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "OpenMRS");
        assert_eq!(hits[1].name, "OpenEMR");

        let hits = store.search("hospital").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "GNU Health");
    }

    #[test]
    fn search_is_case_sensitive_and_literal() {
        let (_dir, store) = seeded_store();
        assert!(store.search("openmrs").unwrap().is_empty());
        assert!(store.search("Open%").unwrap().is_empty());
        assert!(store.search("quantum gravity").unwrap().is_empty());
    }

    #[test]
    fn question_naming_a_record_matches_it() {
        let (_dir, store) = seeded_store();
        let hits = store.search("What is OpenMRS?").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].summary_line(), "OpenMRS: Customizable EMR system.");
    }

    #[test]
    fn record_keys_sort_numerically_past_five_digits() {
        let keys: Vec<String> = [0usize, 9, 99_999, 100_000, 1_000_000, usize::MAX]
            .iter()
            .map(|&i| KnowledgeStore::record_key(i))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(sorted, keys);
        assert!(keys.iter().all(|k| k.len() == KEY_PREFIX.len() + 20));
    }

    #[test]
    fn search_is_stable_for_identical_input() {
        let (_dir, store) = seeded_store();
        assert_eq!(store.search("e").unwrap(), store.search("e").unwrap());
    }

    #[test]
    fn corrupt_record_surfaces_as_storage_error() {
        let (_dir, store) = seeded_store();
        store
            .db
            .open_tree(TREE_NAME)
            .unwrap()
            .insert(KnowledgeStore::record_key(99_999).as_bytes(), &b"not json"[..])
            .unwrap();
        assert!(matches!(
            store.search("Open"),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
