//! # Local fallback store
//!
//! A small key-value store that survives backend outages. Values are JSON;
//! the editor keeps its mirror of drafts under the [`DRAFTS_KEY`] key as an
//! array of [`Draft`] records. The store is either backed by a JSON file or
//! kept purely in memory.
//!
//! Every read-modify-write happens under one mutex and completes
//! synchronously, so two editors sharing a store never interleave updates
//! of the same key.

use crate::drafts::Draft;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key holding the mirrored drafts.
pub const DRAFTS_KEY: &str = "drafts";

/// Local key-value store with a typed view of the draft mirror.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::store::LocalDraftStore;
/// use scriptorium_core::drafts::{Draft, DraftStatus};
///
/// let store = LocalDraftStore::in_memory();
/// store.upsert_draft(Draft::new("temp-1", "Title", "Body text", DraftStatus::Draft))?;
/// assert_eq!(store.drafts()?.len(), 1);
/// # Ok::<(), scriptorium_core::Error>(())
/// ```
#[derive(Debug)]
pub struct LocalDraftStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl LocalDraftStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open a file-backed store, creating it lazily on first write.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file exists but cannot be read or is
    /// not a JSON object.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                crate::storage_error!("Failed to read {}: {}", path.display(), e)
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    crate::storage_error!("Failed to parse {}: {}", path.display(), e)
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened local store at {} with {} keys", path.display(), entries.len());
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// File backing the store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.lock()?;
        Ok(entries.get(key).cloned())
    }

    /// Replace the value stored under `key`.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    /// Remove `key` entirely.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    /// All mirrored drafts.
    ///
    /// An unreadable `drafts` entry is treated as empty rather than failing
    /// the caller: the mirror is a fallback, never the source of truth.
    pub fn drafts(&self) -> Result<Vec<Draft>> {
        let entries = self.lock()?;
        Ok(Self::read_drafts(&entries))
    }

    /// Insert a draft or replace the entry with the same id.
    pub fn upsert_draft(&self, draft: Draft) -> Result<()> {
        self.modify_drafts(|drafts| {
            match drafts.iter_mut().find(|d| d.id == draft.id) {
                Some(existing) => *existing = draft,
                None => drafts.push(draft),
            }
        })
    }

    /// Store `draft`, dropping the entry recorded under `previous_id`.
    ///
    /// Used when a draft mirrored under a temporary id receives its
    /// server id.
    pub fn replace_draft(&self, previous_id: &str, draft: Draft) -> Result<()> {
        self.modify_drafts(|drafts| {
            drafts.retain(|d| d.id != previous_id && d.id != draft.id);
            drafts.push(draft);
        })
    }

    /// Remove the draft with `id`. Returns whether an entry was removed.
    pub fn remove_draft(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        self.modify_drafts(|drafts| {
            let before = drafts.len();
            drafts.retain(|d| d.id != id);
            removed = drafts.len() != before;
        })?;
        Ok(removed)
    }

    fn modify_drafts<F: FnOnce(&mut Vec<Draft>)>(&self, f: F) -> Result<()> {
        self.update(|entries| {
            let mut drafts = Self::read_drafts(entries);
            f(&mut drafts);
            match serde_json::to_value(&drafts) {
                Ok(value) => {
                    entries.insert(DRAFTS_KEY.to_string(), value);
                }
                Err(e) => warn!("Failed to encode drafts: {}", e),
            }
        })
    }

    fn read_drafts(entries: &BTreeMap<String, Value>) -> Vec<Draft> {
        match entries.get(DRAFTS_KEY) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(drafts) => drafts,
                Err(e) => {
                    warn!("Ignoring unreadable '{}' entry: {}", DRAFTS_KEY, e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    fn update<F: FnOnce(&mut BTreeMap<String, Value>)>(&self, f: F) -> Result<()> {
        let mut entries = self.lock()?;
        f(&mut *entries);
        self.flush(&entries)
    }

    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(path, content)
            .map_err(|e| crate::storage_error!("Failed to write {}: {}", path.display(), e))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("Local store lock poisoned"))
    }
}

impl Default for LocalDraftStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::DraftStatus;
    use tempfile::tempdir;

    fn draft(id: &str, title: &str) -> Draft {
        Draft::new(id, title, "some words here", DraftStatus::Draft)
    }

    #[test]
    fn test_upsert_replaces_same_id() {
        let store = LocalDraftStore::in_memory();
        store.upsert_draft(draft("a", "First")).unwrap();
        store.upsert_draft(draft("a", "Renamed")).unwrap();
        store.upsert_draft(draft("b", "Other")).unwrap();

        let drafts = store.drafts().unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].title, "Renamed");
    }

    #[test]
    fn test_replace_draft_drops_temporary_entry() {
        let store = LocalDraftStore::in_memory();
        store.upsert_draft(draft("temp-1", "Title")).unwrap();
        store.replace_draft("temp-1", draft("p-9", "Title")).unwrap();

        let ids: Vec<_> = store.drafts().unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["p-9"]);
    }

    #[test]
    fn test_remove_draft_is_idempotent() {
        let store = LocalDraftStore::in_memory();
        store.upsert_draft(draft("a", "A")).unwrap();
        assert!(store.remove_draft("a").unwrap());
        assert!(!store.remove_draft("a").unwrap());
        assert!(store.drafts().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_drafts_entry_is_empty() {
        let store = LocalDraftStore::in_memory();
        store.set(DRAFTS_KEY, serde_json::json!({"not": "a list"})).unwrap();
        assert!(store.drafts().unwrap().is_empty());

        store.upsert_draft(draft("a", "A")).unwrap();
        assert_eq!(store.drafts().unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("local.json");

        {
            let store = LocalDraftStore::open(&path).unwrap();
            store.upsert_draft(draft("a", "Persisted")).unwrap();
            store.set("theme", serde_json::json!("sepia")).unwrap();
        }

        let reopened = LocalDraftStore::open(&path).unwrap();
        assert_eq!(reopened.drafts().unwrap()[0].title, "Persisted");
        assert_eq!(reopened.get("theme").unwrap(), Some(serde_json::json!("sepia")));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["drafts"][0]["lastModified"].is_string());
        assert_eq!(raw["drafts"][0]["wordCount"], 3);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let err = LocalDraftStore::open(&path).unwrap_err();
        assert_eq!(err.category(), "Storage");
    }
}
