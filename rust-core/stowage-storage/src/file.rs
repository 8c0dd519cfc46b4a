// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flat-file storage backend for Stowage.
//
// One JSON document holds every store using the backend, one section per
// raw-key prefix, each mapping raw keys to JSON-encoded values. The whole
// document is rewritten on each change (temp file, then rename), so a crash
// leaves either the old or the new version on disk.
//
// # Design
//
// - Sections are keyed by the whole prefix, so a store never sees another
//   store's keys, even when one prefix starts with another.
// - A change is applied to a copy, persisted, and only then swapped in; a
//   failed write (I/O, quota) leaves memory and disk untouched.
// - Supports lazy stores: single entries are fetched on cache misses.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::backend::{decode_prefixed, encode_prefixed, mirror_put, mirror_remove, Backend};
use crate::cache::IndexedCache;
use crate::error::{StoreError, StoreResult};
use crate::reply::{Reply, StoreDeferred};
use crate::store::Store;

/// Raw key -> JSON-encoded value, for one store.
type Section = BTreeMap<String, String>;

/// Prefix -> section.
type Entries = BTreeMap<String, Section>;

/// A backend persisting every store into one JSON file.
///
/// # Example
///
/// ```rust,no_run
/// use std::rc::Rc;
/// use stowage_storage::file::FileBackend;
/// use stowage_storage::{Store, StoreOptions};
///
/// let backend = FileBackend::open("/tmp/stowage.json").unwrap();
/// let store = Store::open_with(Rc::new(backend), StoreOptions::new("todos"));
/// store.put(&1, &"persisted");
/// ```
pub struct FileBackend {
    path: PathBuf,
    max_bytes: Option<usize>,
    entries: RefCell<Entries>,
}

impl FileBackend {
    /// Open or create the document at `path`.
    ///
    /// Creates parent directories if needed. A missing file is an empty
    /// document; an unreadable or malformed one is an error.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Entries::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                StoreError::CorruptedData(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = entries.len(), "opened file backend");

        Ok(Self {
            path,
            max_bytes: None,
            entries: RefCell::new(entries),
        })
    }

    /// Refuse writes that would grow the document beyond `max_bytes`.
    pub fn with_quota(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of raw keys across all stores.
    pub fn len(&self) -> usize {
        self.entries.borrow().values().map(Section::len).sum()
    }

    /// True when the document holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw keys and raw values of the store with `prefix`, in key order.
    fn scan_store(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .borrow()
            .get(prefix)
            .map(|section| {
                section
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn read_value(&self, prefix: &str, raw_key: &str) -> Option<String> {
        self.entries.borrow().get(prefix)?.get(raw_key).cloned()
    }

    /// Apply `change` to a copy of the entries, persist it, then keep it.
    fn mutate<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Entries),
    {
        let mut next = self.entries.borrow().clone();
        change(&mut next);
        self.persist(&next)?;
        *self.entries.borrow_mut() = next;
        Ok(())
    }

    fn persist(&self, entries: &Entries) -> StoreResult<()> {
        let text = serde_json::to_string(entries).map_err(StoreError::encoding)?;

        if let Some(max) = self.max_bytes {
            if text.len() > max {
                return Err(StoreError::QuotaExceeded {
                    size: text.len(),
                    max,
                });
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &text)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), bytes = text.len(), "file backend written");
        Ok(())
    }

    fn load(&self, prefix: &str) -> StoreResult<IndexedCache<Value, Value>> {
        let mut cache = IndexedCache::new();
        for (raw_key, raw_value) in self.scan_store(prefix) {
            let key = decode_prefixed(prefix, &raw_key)?;
            let value = serde_json::from_str(&raw_value).map_err(StoreError::corrupted)?;
            cache.put(raw_key, value, key);
        }
        Ok(cache)
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn probe(&self) -> bool {
        let probe = self.path.with_extension("probe");
        fs::write(&probe, b"probe").is_ok() && fs::remove_file(&probe).is_ok()
    }

    fn encode_key(&self, store: &Store, key: &Value) -> StoreResult<String> {
        encode_prefixed(&store.options().raw_prefix(), key)
    }

    fn reload(&self, store: &Store, deferred: StoreDeferred) {
        match self.load(&store.options().raw_prefix()) {
            Ok(cache) => {
                store.cache_mut().overwrite(cache);
                store.set_loaded(true);
                store.finish_reload(&deferred);
            }
            Err(err) => deferred.resolve_failure(err),
        }
    }

    fn get(&self, store: &Store, key: Value, raw_key: String, deferred: StoreDeferred) {
        let raw_value = self.read_value(&store.options().raw_prefix(), &raw_key);
        let Some(raw_value) = raw_value else {
            return deferred.resolve_success(Reply::Entry { key, value: None });
        };

        match serde_json::from_str::<Value>(&raw_value) {
            Ok(value) => {
                store.cache_mut().put(raw_key, value.clone(), key.clone());
                deferred.resolve_success(Reply::Entry {
                    key,
                    value: Some(value),
                });
            }
            Err(err) => deferred.resolve_failure(StoreError::corrupted(err)),
        }
    }

    fn put(&self, store: &Store, key: Value, value: Value, raw_key: String, deferred: StoreDeferred) {
        let raw_value = match serde_json::to_string(&value) {
            Ok(raw_value) => raw_value,
            Err(err) => return deferred.resolve_failure(StoreError::encoding(err)),
        };

        let prefix = store.options().raw_prefix();
        let written = self.mutate(|entries| {
            entries
                .entry(prefix)
                .or_default()
                .insert(raw_key.clone(), raw_value);
        });
        match written {
            Ok(()) => deferred.resolve_success(mirror_put(store, key, value, raw_key)),
            Err(err) => deferred.resolve_failure(err),
        }
    }

    fn remove(
        &self,
        store: &Store,
        key: Value,
        raw_key: String,
        cached: Option<Value>,
        deferred: StoreDeferred,
    ) {
        let prefix = store.options().raw_prefix();
        let mut removed = None;
        let written = self.mutate(|entries| {
            if let Some(section) = entries.get_mut(&prefix) {
                removed = section.remove(&raw_key);
                if section.is_empty() {
                    entries.remove(&prefix);
                }
            }
        });
        if let Err(err) = written {
            return deferred.resolve_failure(err);
        }

        let fetched = cached.or_else(|| removed.and_then(|raw| serde_json::from_str(&raw).ok()));
        deferred.resolve_success(mirror_remove(store, key, &raw_key, fetched));
    }

    fn destroy(&self, store: &Store, deferred: StoreDeferred) {
        let prefix = store.options().raw_prefix();
        let written = self.mutate(|entries| {
            entries.remove(&prefix);
        });
        match written {
            Ok(()) => {
                store.cache_mut().reset();
                deferred.resolve_success(Reply::Ready);
            }
            Err(err) => deferred.resolve_failure(err),
        }
    }

    fn size(&self, store: &Store, deferred: StoreDeferred) {
        let size = self
            .entries
            .borrow()
            .get(&store.options().raw_prefix())
            .map_or(0, Section::len);
        deferred.resolve_success(Reply::Size(size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use tempfile::TempDir;

    use crate::config::StoreOptions;

    fn reply(deferred: StoreDeferred) -> Reply {
        deferred
            .outcome()
            .expect("file backend resolves synchronously")
            .expect("operation succeeds")
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data.json");
        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.is_empty());
        assert!(backend.probe());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_scan_keeps_to_one_section() {
        let dir = TempDir::new().unwrap();
        let backend = Rc::new(FileBackend::open(dir.path().join("db.json")).unwrap());
        let a = Store::open_with(backend.clone(), StoreOptions::new("a"));
        let ab = Store::open_with(backend.clone(), StoreOptions::new("a-b"));

        reply(a.put(&1, &"one"));
        reply(ab.put(&1, &"uno"));

        let scanned = backend.scan_store("a-");
        assert_eq!(scanned, vec![("a-1".to_string(), "\"one\"".to_string())]);
        assert_eq!(backend.len(), 2);

        reply(a.remove(&1));
        assert_eq!(backend.len(), 1);
        assert!(backend.scan_store("a-").is_empty());
    }

    #[test]
    fn test_quota_rejects_and_keeps_state() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path().join("db.json"))
            .unwrap()
            .with_quota(32);
        let store = Store::open_with(Rc::new(backend), StoreOptions::new("q"));

        reply(store.put(&1, &"ok"));
        let err = store
            .put(&2, &"x".repeat(64))
            .outcome()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { max: 32, .. }));
        assert_eq!(reply(store.size()), Reply::Size(1));
        assert_eq!(reply(store.get(&2)).value(), None);
    }

    #[test]
    fn test_corrupted_document_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileBackend::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptedData(_)));
    }

    #[test]
    fn test_corrupted_value_fails_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, r#"{"bad-": {"bad-1": "{oops"}}"#).unwrap();

        let backend = FileBackend::open(&path).unwrap();
        let store = Store::open_with(Rc::new(backend), StoreOptions::new("bad"));

        let err = store.init().outcome().unwrap().unwrap_err();
        assert!(matches!(err, StoreError::CorruptedData(_)));
        assert!(!store.initialized());
    }
}
