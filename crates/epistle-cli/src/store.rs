//! File-backed last-seen ids.
//!
//! One JSON object mapping convo id to message id, rewritten atomically
//! (write to a sibling temp file, then rename) on every persist.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use epistle_core::{ConvoId, LastSeenStore, MessageId, StoreError};

/// [`LastSeenStore`] persisted as JSON.
#[derive(Debug)]
pub struct JsonLastSeenStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<ConvoId, MessageId>>,
}

impl JsonLastSeenStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// - `Io` if the file exists but cannot be read
    /// - `Serialization` if it is not a JSON object of ids
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", path.display()))),
        };
        tracing::debug!(path = %path.display(), count = entries.len(), "opened last-seen store");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<ConvoId, MessageId>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl LastSeenStore for JsonLastSeenStore {
    fn last_seen(&self, convo_id: &str) -> Option<MessageId> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(convo_id).copied()
    }

    fn persist_last_seen(&self, convo_id: &str, id: MessageId) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(convo_id) == Some(&id) {
            return Ok(());
        }
        entries.insert(convo_id.to_string(), id);
        self.write(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLastSeenStore::open(dir.path().join("last_seen.json")).unwrap();
        assert_eq!(store.last_seen("c1"), None);
    }

    #[test]
    fn persisted_ids_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("last_seen.json");

        let store = JsonLastSeenStore::open(&path).unwrap();
        store.persist_last_seen("c1", 41).unwrap();
        store.persist_last_seen("c1", 42).unwrap();
        store.persist_last_seen("c2", 7).unwrap();
        drop(store);

        let store = JsonLastSeenStore::open(&path).unwrap();
        assert_eq!(store.last_seen("c1"), Some(42));
        assert_eq!(store.last_seen("c2"), Some(7));
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_seen.json");
        fs::write(&path, b"not json").unwrap();

        assert!(matches!(JsonLastSeenStore::open(&path), Err(StoreError::Serialization(_))));
    }
}
