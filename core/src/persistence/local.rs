//! Key-value storage and the whole-list local backend.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use super::{Backend, PersistenceError};
use crate::types::{Category, ItemId, ItemPatch, TodoItem};

/// String key-value storage.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Returns the value under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Removes `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        (**self).remove(key)
    }
}

/// One JSON file per key inside a directory.
///
/// Keys map to file names by lowercasing and collapsing every run of
/// non-alphanumeric characters into `-`, so `Important & Urgent` is stored
/// in `important-urgent.json`. Writes go to a temporary file that is then
/// renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Uses `dir`, creating it on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    let mut pending_dash = false;
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !stem.is_empty() {
                stem.push('-');
            }
            pending_dash = false;
            stem.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if stem.is_empty() {
        stem.push('_');
    }
    stem
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        trace!(path = %path.display(), bytes = value.len(), "Wrote key");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Saves each category as a JSON array under its label.
#[derive(Debug, Clone)]
pub struct LocalBackend<K> {
    store: K,
}

impl<K: KeyValueStore> LocalBackend<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    fn save_all(&self, category: Category, items: &[TodoItem]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(items)?;
        self.store.set(category.label(), &json)?;
        debug!(category = %category, count = items.len(), "Saved list");
        Ok(())
    }
}

impl<K: KeyValueStore> Backend for LocalBackend<K> {
    async fn load(&self, category: Category) -> Result<Vec<TodoItem>, PersistenceError> {
        let items: Vec<TodoItem> = match self.store.get(category.label())? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        debug!(category = %category, count = items.len(), "Loaded list");
        Ok(items)
    }

    async fn create(
        &self,
        category: Category,
        item: &TodoItem,
        items: &[TodoItem],
    ) -> Result<TodoItem, PersistenceError> {
        self.save_all(category, items)?;
        Ok(item.clone())
    }

    async fn update(
        &self,
        category: Category,
        _id: &ItemId,
        _patch: &ItemPatch,
        items: &[TodoItem],
    ) -> Result<(), PersistenceError> {
        self.save_all(category, items)
    }

    async fn delete(
        &self,
        category: Category,
        _id: &ItemId,
        items: &[TodoItem],
    ) -> Result<(), PersistenceError> {
        self.save_all(category, items)
    }
}
