// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed persistent storage backend for Stowage.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to keep every
// store durable. Each store gets its own table, named after its raw-key
// prefix, so stores never see each other's keys even when one prefix
// starts with another.
//
// # Design
//
// - Read transactions for reload, get and size.
// - One write transaction per put/remove/destroy, committed before the cache
//   is touched, so the cache never runs ahead of the database.
// - A missing table reads as empty; it is created on first write and
//   dropped by `destroy`.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, Table, TableDefinition};
use serde_json::Value;
use tracing::debug;

use crate::backend::{decode_prefixed, encode_prefixed, mirror_put, mirror_remove, Backend};
use crate::cache::IndexedCache;
use crate::error::{StoreError, StoreResult};
use crate::reply::{Reply, StoreDeferred};
use crate::store::Store;

/// Name of the table holding the store with raw-key prefix `prefix`.
fn table_name(prefix: &str) -> String {
    format!("stowage:{prefix}")
}

fn store_table(name: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(name)
}

/// A persistent storage backend powered by redb.
///
/// # Example
///
/// ```rust,no_run
/// use std::rc::Rc;
/// use stowage_storage::redb_backend::RedbBackend;
/// use stowage_storage::{Store, StoreOptions};
///
/// let backend = RedbBackend::open("/tmp/stowage.redb").unwrap();
/// let store = Store::open_with(Rc::new(backend), StoreOptions::new("todos"));
/// store.put(&1, &"durable");
/// ```
pub struct RedbBackend {
    /// The redb database handle.
    db: Database,
    /// Path to the database file (for diagnostics).
    path: PathBuf,
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StoreError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb backend");

        Ok(Self { db, path })
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_value(&self, prefix: &str, raw_key: &str) -> StoreResult<Option<String>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::BackendUnavailable(format!("read txn: {e}")))?;

        let name = table_name(prefix);
        let table = match txn.open_table(store_table(&name)) {
            Ok(t) => t,
            // Table doesn't exist yet
            Err(_) => return Ok(None),
        };

        match table.get(raw_key) {
            Ok(Some(value)) => Ok(Some(value.value().to_string())),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::CorruptedData(format!("get: {e}"))),
        }
    }

    /// Raw keys and raw values of one store, in key order.
    fn scan_store(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::BackendUnavailable(format!("read txn: {e}")))?;

        let name = table_name(prefix);
        let table = match txn.open_table(store_table(&name)) {
            Ok(t) => t,
            Err(_) => return Ok(Vec::new()),
        };

        // "" is the smallest key, so this walks the whole table.
        let iter = table
            .range(""..)
            .map_err(|e| StoreError::CorruptedData(format!("range scan: {e}")))?;

        let mut results = Vec::new();
        for entry in iter {
            let entry = entry.map_err(|e| StoreError::CorruptedData(format!("scan entry: {e}")))?;
            results.push((entry.0.value().to_string(), entry.1.value().to_string()));
        }
        Ok(results)
    }

    /// Run `change` on the table of `prefix` inside one committed write
    /// transaction.
    fn write<R, F>(&self, prefix: &str, change: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Table<'_, &'static str, &'static str>) -> StoreResult<R>,
    {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::BackendUnavailable(format!("write txn: {e}")))?;
        let result = {
            let name = table_name(prefix);
            let mut table = txn
                .open_table(store_table(&name))
                .map_err(|e| StoreError::BackendUnavailable(format!("open table: {e}")))?;
            change(&mut table)?
        };
        txn.commit()
            .map_err(|e| StoreError::CorruptedData(format!("commit: {e}")))?;
        Ok(result)
    }

    fn drop_store(&self, prefix: &str) -> StoreResult<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::BackendUnavailable(format!("write txn: {e}")))?;
        let name = table_name(prefix);
        txn.delete_table(store_table(&name))
            .map_err(|e| StoreError::BackendUnavailable(format!("delete table: {e}")))?;
        txn.commit()
            .map_err(|e| StoreError::CorruptedData(format!("commit: {e}")))?;
        Ok(())
    }

    fn load(&self, prefix: &str) -> StoreResult<IndexedCache<Value, Value>> {
        let mut cache = IndexedCache::new();
        for (raw_key, raw_value) in self.scan_store(prefix)? {
            let key = decode_prefixed(prefix, &raw_key)?;
            let value = serde_json::from_str(&raw_value).map_err(StoreError::corrupted)?;
            cache.put(raw_key, value, key);
        }
        Ok(cache)
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl Backend for RedbBackend {
    fn name(&self) -> &str {
        "redb"
    }

    fn probe(&self) -> bool {
        self.db
            .begin_write()
            .map(|txn| txn.abort().is_ok())
            .unwrap_or(false)
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
        let prefix = store.options().raw_prefix();
        let fetched = self.read_value(&prefix, &raw_key).and_then(|raw| {
            raw.map(|raw| serde_json::from_str::<Value>(&raw).map_err(StoreError::corrupted))
                .transpose()
        });

        match fetched {
            Ok(Some(value)) => {
                store.cache_mut().put(raw_key, value.clone(), key.clone());
                deferred.resolve_success(Reply::Entry {
                    key,
                    value: Some(value),
                });
            }
            Ok(None) => deferred.resolve_success(Reply::Entry { key, value: None }),
            Err(err) => deferred.resolve_failure(err),
        }
    }

    fn put(&self, store: &Store, key: Value, value: Value, raw_key: String, deferred: StoreDeferred) {
        let raw_value = match serde_json::to_string(&value) {
            Ok(raw_value) => raw_value,
            Err(err) => return deferred.resolve_failure(StoreError::encoding(err)),
        };

        let written = self.write(&store.options().raw_prefix(), |table| {
            table
                .insert(raw_key.as_str(), raw_value.as_str())
                .map_err(|e| StoreError::CorruptedData(format!("insert: {e}")))?;
            Ok(())
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
        let removed = self.write(&store.options().raw_prefix(), |table| {
            let removed = table
                .remove(raw_key.as_str())
                .map_err(|e| StoreError::CorruptedData(format!("remove: {e}")))?
                .map(|guard| guard.value().to_string());
            Ok(removed)
        });

        match removed {
            Ok(removed) => {
                let fetched =
                    cached.or_else(|| removed.and_then(|raw| serde_json::from_str(&raw).ok()));
                deferred.resolve_success(mirror_remove(store, key, &raw_key, fetched));
            }
            Err(err) => deferred.resolve_failure(err),
        }
    }

    fn destroy(&self, store: &Store, deferred: StoreDeferred) {
        match self.drop_store(&store.options().raw_prefix()) {
            Ok(()) => {
                store.cache_mut().reset();
                deferred.resolve_success(Reply::Ready);
            }
            Err(err) => deferred.resolve_failure(err),
        }
    }

    fn size(&self, store: &Store, deferred: StoreDeferred) {
        match self.scan_store(&store.options().raw_prefix()) {
            Ok(entries) => deferred.resolve_success(Reply::Size(entries.len())),
            Err(err) => deferred.resolve_failure(err),
        }
    }
}
