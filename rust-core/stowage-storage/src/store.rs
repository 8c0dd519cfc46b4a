// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store facade for Stowage.
//
// `Store` ties the pieces together: arguments are encoded to JSON on the
// caller's turn, the initialization gate decides whether the call runs now
// or waits, and the selected backend performs the I/O and mirrors it into
// the indexed cache. Every operation answers through a `StoreDeferred`.
//
// No `RefCell` borrow of the store is ever held while a backend or a
// listener runs; both are free to call back into the store.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use stowage_deferred::Deferred;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::cache::IndexedCache;
use crate::config::StoreOptions;
use crate::error::{StoreError, StoreResult};
use crate::gate::{InitGate, PendingOperation};
use crate::registry::{BackendRegistry, Plugin};
use crate::reply::{Reply, StoreDeferred};

/// The cache every store mirrors its backend into: original keys and values
/// are both JSON documents.
pub type StoreCache = IndexedCache<Value, Value>;

/// A key-value collection backed by one storage backend.
///
/// Cloning a `Store` yields another handle to the same collection.
///
/// # Example
///
/// ```rust
/// use stowage_storage::{BackendRegistry, Store, StoreOptions};
///
/// let registry = BackendRegistry::with_defaults();
/// let store = Store::open(&registry, StoreOptions::new("todos")).unwrap();
///
/// store.put(&1, &"write docs");
/// let reply = store.get(&1).outcome().unwrap().unwrap();
/// assert_eq!(reply.value(), Some(&serde_json::json!("write docs")));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    options: StoreOptions,
    backend: Rc<dyn Backend>,
    cache: RefCell<StoreCache>,
    gate: RefCell<InitGate<Store, Reply, StoreError>>,
    loaded: Cell<bool>,
    initializing: StoreDeferred,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(StoreError::encoding)
}

fn to_json_all<T: Serialize>(values: &[T]) -> StoreResult<Vec<Value>> {
    values.iter().map(to_json).collect()
}

impl Store {
    /// Open a store: select a backend from `registry`, run the registry's
    /// plugins, then start initialization.
    ///
    /// Fails only when no backend is available.
    pub fn open(registry: &BackendRegistry, options: StoreOptions) -> StoreResult<Store> {
        let backend = registry.select(options.backend.as_deref())?;
        Ok(Self::start(backend, options, registry.plugins()))
    }

    /// Open a store on a specific backend, bypassing selection.
    pub fn open_with(backend: Rc<dyn Backend>, options: StoreOptions) -> Store {
        Self::start(backend, options, &[])
    }

    fn start(backend: Rc<dyn Backend>, options: StoreOptions, plugins: &[Plugin]) -> Store {
        let store = Store {
            inner: Rc::new(StoreInner {
                options,
                backend,
                cache: RefCell::new(IndexedCache::new()),
                gate: RefCell::new(InitGate::new()),
                loaded: Cell::new(false),
                initializing: Deferred::new(),
            }),
        };

        for plugin in plugins {
            plugin(&store);
        }

        debug!(
            store = %store.name(),
            backend = store.backend_name(),
            lazy = store.options().lazy,
            "initializing store"
        );
        store
            .backend()
            .init(&store, store.inner.initializing.clone());
        store
    }

    // -- accessors ---------------------------------------------------------

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// The backend this store delegates to.
    pub fn backend(&self) -> Rc<dyn Backend> {
        Rc::clone(&self.inner.backend)
    }

    /// Name of the backend this store delegates to.
    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// True once initialization has completed.
    pub fn initialized(&self) -> bool {
        self.inner.gate.borrow().is_open()
    }

    /// True when the cache mirrors every entry of the backend.
    pub fn loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    /// Mark the cache as a complete (or incomplete) mirror. Backends call
    /// this after a full reload.
    pub fn set_loaded(&self, loaded: bool) {
        self.inner.loaded.set(loaded);
    }

    /// Read access to the cache. Do not hold across store calls.
    pub fn cache(&self) -> Ref<'_, StoreCache> {
        self.inner.cache.borrow()
    }

    /// Write access to the cache. Do not hold across store calls.
    pub fn cache_mut(&self) -> RefMut<'_, StoreCache> {
        self.inner.cache.borrow_mut()
    }

    /// Number of operations waiting for initialization.
    pub fn pending_operations(&self) -> usize {
        self.inner.gate.borrow().pending_len()
    }

    /// Every cached pair as a [`Reply::Entries`].
    pub fn snapshot(&self) -> Reply {
        let cache = self.cache();
        Reply::Entries {
            keys: cache.keys().to_vec(),
            values: cache.values().to_vec(),
        }
    }

    // -- initialization ----------------------------------------------------

    /// The deferred of the initialization started when the store was opened.
    pub fn init(&self) -> StoreDeferred {
        self.inner.initializing.clone()
    }

    /// Open the gate: resolve `deferred` with `reply`, then replay every
    /// queued operation in call order. No-op if already initialized.
    pub fn complete_initialization(&self, deferred: &StoreDeferred, reply: Reply) {
        let queue = self.inner.gate.borrow_mut().open();
        let Some(queue) = queue else {
            return;
        };

        debug!(
            store = %self.name(),
            replayed = queue.len(),
            "store initialized"
        );
        deferred.resolve_success(reply);
        for pending in queue {
            pending.replay(self);
        }
    }

    /// Finish a reload: answer `deferred` with the cached pairs, completing
    /// initialization first if it is still outstanding.
    pub fn finish_reload(&self, deferred: &StoreDeferred) {
        if !deferred.is_pending() {
            return;
        }
        let reply = self.snapshot();
        if self.initialized() {
            deferred.resolve_success(reply);
        } else {
            self.complete_initialization(deferred, reply);
        }
    }

    /// Run `run` once the store is initialized, answering through
    /// `deferred`, which is returned.
    ///
    /// Before initialization completes the call is queued and `deferred`
    /// is reset to pending; it later completes with the replayed result.
    pub fn gated<F>(&self, label: &'static str, deferred: StoreDeferred, run: F) -> StoreDeferred
    where
        F: FnOnce(&Store, StoreDeferred) + 'static,
    {
        let operation = PendingOperation::new(label, deferred.clone(), run);
        let ready = self.inner.gate.borrow_mut().guard(operation);
        if let Some(operation) = ready {
            operation.dispatch(self);
        }
        deferred
    }

    /// Run `callback` with this store and return what it returns.
    pub fn then<R, F>(&self, callback: F) -> R
    where
        F: FnOnce(&Store) -> R,
    {
        callback(self)
    }

    // -- reads -------------------------------------------------------------

    /// Look up `key`. Resolves with [`Reply::Entry`]; `value` is `None`
    /// when the key is absent.
    pub fn get<K: Serialize + ?Sized>(&self, key: &K) -> StoreDeferred {
        let key = to_json(key);
        self.gated("get", Deferred::new(), move |store, deferred| match key {
            Ok(key) => store.get_value(key, deferred),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    fn get_value(&self, key: Value, deferred: StoreDeferred) {
        let raw_key = match self.backend().encode_key(self, &key) {
            Ok(raw_key) => raw_key,
            Err(err) => return deferred.resolve_failure(err),
        };

        let cached = self.cache().get(&raw_key).cloned();
        match cached {
            Some(value) => deferred.resolve_success(Reply::Entry {
                key,
                value: Some(value),
            }),
            None if self.loaded() => deferred.resolve_success(Reply::Entry { key, value: None }),
            None => self.backend().get(self, key, raw_key, deferred),
        }
    }

    /// Look up several keys. Resolves with [`Reply::Lookups`] once every
    /// lookup has succeeded, or fails with the first failure.
    pub fn get_many<K: Serialize>(&self, keys: &[K]) -> StoreDeferred {
        let keys = to_json_all(keys);
        self.gated("get_many", Deferred::new(), move |store, deferred| match keys {
            Ok(keys) => store.each_key(keys, deferred, Store::get_value),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    /// Count the entries. Resolves with [`Reply::Size`].
    pub fn size(&self) -> StoreDeferred {
        self.gated("size", Deferred::new(), |store, deferred| {
            if store.loaded() {
                let size = store.cache().len();
                deferred.resolve_success(Reply::Size(size));
            } else {
                store.backend().size(store, deferred);
            }
        })
    }

    /// Every pair. Resolves with [`Reply::Entries`], reloading first if the
    /// cache is not a complete mirror.
    pub fn all(&self) -> StoreDeferred {
        self.gated("all", Deferred::new(), |store, deferred| {
            if store.loaded() {
                deferred.resolve_success(store.snapshot());
            } else {
                deferred.bind_to(&store.reload());
            }
        })
    }

    /// Call `callback(value, key)` for every pair, reloading first if the
    /// cache is not a complete mirror. Waits for initialization.
    ///
    /// A failed reload is logged and the callback never runs.
    pub fn each<F>(&self, callback: F) -> &Self
    where
        F: FnMut(&Value, &Value) + 'static,
    {
        self.gated("each", Deferred::new(), move |store, _| {
            store.each_now(callback)
        });
        self
    }

    fn each_now<F>(&self, mut callback: F)
    where
        F: FnMut(&Value, &Value) + 'static,
    {
        if self.loaded() {
            let (keys, values) = {
                let cache = self.cache();
                (cache.keys().to_vec(), cache.values().to_vec())
            };
            for (key, value) in keys.iter().zip(&values) {
                callback(value, key);
            }
            return;
        }

        let name = self.name().to_string();
        self.reload().then(
            move |reply| {
                if let Some((keys, values)) = reply.entries() {
                    for (key, value) in keys.iter().zip(values) {
                        callback(value, key);
                    }
                }
                None
            },
            move |err| {
                warn!(store = %name, error = %err, "each: reload failed");
                None
            },
        );
    }

    /// Load every entry into the cache. Resolves with [`Reply::Entries`].
    ///
    /// Not gated: a reload issued before initialization completes may itself
    /// complete initialization.
    pub fn reload(&self) -> StoreDeferred {
        let deferred = Deferred::new();
        self.backend().reload(self, deferred.clone());
        deferred
    }

    // -- writes ------------------------------------------------------------

    /// Store `value` under `key`. Resolves with [`Reply::Stored`].
    pub fn put<K, V>(&self, key: &K, value: &V) -> StoreDeferred
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let entry = to_json(key).and_then(|key| Ok((key, to_json(value)?)));
        self.gated("put", Deferred::new(), move |store, deferred| match entry {
            Ok((key, value)) => store.put_value(key, value, deferred),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    fn put_value(&self, key: Value, value: Value, deferred: StoreDeferred) {
        match self.backend().encode_key(self, &key) {
            Ok(raw_key) => self.backend().put(self, key, value, raw_key, deferred),
            Err(err) => deferred.resolve_failure(err),
        }
    }

    /// Store a record under its key field, generating a UUID for records
    /// without one. Resolves with [`Reply::Record`] holding the saved record.
    ///
    /// Fails with [`StoreError::InvalidRecord`] unless the record serializes
    /// to a JSON object.
    pub fn save<R: Serialize + ?Sized>(&self, record: &R) -> StoreDeferred {
        let record = to_json(record);
        self.gated("save", Deferred::new(), move |store, deferred| match record {
            Ok(record) => store.save_record(record, deferred),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    fn save_record(&self, mut record: Value, deferred: StoreDeferred) {
        let field = &self.inner.options.key;
        let Some(fields) = record.as_object_mut() else {
            return deferred.resolve_failure(StoreError::InvalidRecord(
                "records must be JSON objects".to_string(),
            ));
        };

        let key = match fields.get(field) {
            Some(key) => key.clone(),
            None => {
                let id = Value::String(Uuid::new_v4().to_string());
                fields.insert(field.clone(), id.clone());
                id
            }
        };

        let put = Deferred::new();
        let saved = record.clone();
        deferred.bind_to_with(&put, move |_| Reply::Record(saved));
        self.put_value(key, record, put);
    }

    /// Save several records. Resolves with [`Reply::Records`] once all are
    /// saved, or fails with the first failure.
    pub fn batch<R: Serialize>(&self, records: &[R]) -> StoreDeferred {
        let records = to_json_all(records);
        self.gated("batch", Deferred::new(), move |store, deferred| match records {
            Ok(records) => store.batch_records(records, deferred),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    fn batch_records(&self, records: Vec<Value>, deferred: StoreDeferred) {
        if records.is_empty() {
            return deferred.resolve_success(Reply::Records(Vec::new()));
        }

        let group = Deferred::group(records.len());
        deferred.bind_to(&group);

        let saved = Rc::new(RefCell::new(vec![Value::Null; records.len()]));
        for (i, record) in records.into_iter().enumerate() {
            if !group.is_pending() {
                break;
            }
            let single: StoreDeferred = Deferred::new();
            let (on_saved, on_failed) = (group.clone(), group.clone());
            let saved = Rc::clone(&saved);
            single.then(
                move |reply| {
                    if let Some(record) = reply.value() {
                        saved.borrow_mut()[i] = record.clone();
                    }
                    on_saved.resolve_success_with(|| Reply::Records(saved.borrow().clone()));
                    None
                },
                move |err| {
                    on_failed.resolve_failure(err.clone());
                    None
                },
            );
            self.save_record(record, single);
        }
    }

    /// Remove `key`. Resolves with [`Reply::Entry`] carrying the removed
    /// value, `None` if there was none.
    pub fn remove<K: Serialize + ?Sized>(&self, key: &K) -> StoreDeferred {
        let key = to_json(key);
        self.gated("remove", Deferred::new(), move |store, deferred| match key {
            Ok(key) => store.remove_value(key, deferred),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    fn remove_value(&self, key: Value, deferred: StoreDeferred) {
        let raw_key = match self.backend().encode_key(self, &key) {
            Ok(raw_key) => raw_key,
            Err(err) => return deferred.resolve_failure(err),
        };

        let cached = self.cache().get(&raw_key).cloned();
        if cached.is_none() && self.loaded() {
            return deferred.resolve_success(Reply::Entry { key, value: None });
        }
        self.backend().remove(self, key, raw_key, cached, deferred);
    }

    /// Remove several keys. Resolves with [`Reply::Lookups`] holding the
    /// removed values, or fails with the first failure.
    pub fn remove_many<K: Serialize>(&self, keys: &[K]) -> StoreDeferred {
        let keys = to_json_all(keys);
        self.gated("remove_many", Deferred::new(), move |store, deferred| match keys {
            Ok(keys) => store.each_key(keys, deferred, Store::remove_value),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    /// Run `single` for each key as one member of a group, collecting the
    /// per-key values into a [`Reply::Lookups`].
    fn each_key(&self, keys: Vec<Value>, deferred: StoreDeferred, single: fn(&Store, Value, StoreDeferred)) {
        if keys.is_empty() {
            return deferred.resolve_success(Reply::Lookups {
                keys: Vec::new(),
                values: Vec::new(),
            });
        }

        let group = Deferred::group(keys.len());
        deferred.bind_to(&group);

        let keys = Rc::new(keys);
        let values = Rc::new(RefCell::new(vec![None; keys.len()]));
        for (i, key) in keys.iter().enumerate() {
            if !group.is_pending() {
                break;
            }
            let member: StoreDeferred = Deferred::new();
            let (on_done, on_failed) = (group.clone(), group.clone());
            let (all_keys, values) = (Rc::clone(&keys), Rc::clone(&values));
            member.then(
                move |reply| {
                    values.borrow_mut()[i] = reply.value().cloned();
                    on_done.resolve_success_with(|| Reply::Lookups {
                        keys: all_keys.to_vec(),
                        values: values.borrow().clone(),
                    });
                    None
                },
                move |err| {
                    on_failed.resolve_failure(err.clone());
                    None
                },
            );
            single(self, key.clone(), member);
        }
    }

    /// Remove every entry. Resolves with [`Reply::Ready`].
    pub fn destroy(&self) -> StoreDeferred {
        self.gated("destroy", Deferred::new(), |store, deferred| {
            store.backend().destroy(store, deferred)
        })
    }

    /// Replace the whole collection: destroy, then store `values[i]` under
    /// `keys[i]`. Resolves with [`Reply::Entries`] holding the new pairs.
    ///
    /// Fails with [`StoreError::MismatchedLengths`] when the slices differ
    /// in length.
    pub fn reset<K, V>(&self, keys: &[K], values: &[V]) -> StoreDeferred
    where
        K: Serialize,
        V: Serialize,
    {
        let entries = if keys.len() == values.len() {
            to_json_all(keys).and_then(|keys| Ok((keys, to_json_all(values)?)))
        } else {
            Err(StoreError::MismatchedLengths {
                keys: keys.len(),
                values: values.len(),
            })
        };
        self.gated("reset", Deferred::new(), move |store, deferred| match entries {
            Ok((keys, values)) => store.reset_entries(keys, values, deferred),
            Err(err) => deferred.resolve_failure(err),
        })
    }

    fn reset_entries(&self, keys: Vec<Value>, values: Vec<Value>, deferred: StoreDeferred) {
        let backend = self.backend();
        let raw_keys: StoreResult<Vec<String>> =
            keys.iter().map(|key| backend.encode_key(self, key)).collect();
        let raw_keys = match raw_keys {
            Ok(raw_keys) => raw_keys,
            Err(err) => return deferred.resolve_failure(err),
        };

        let destroyed: StoreDeferred = Deferred::new();
        let (on_destroyed, on_failed) = (deferred.clone(), deferred);
        let store = self.clone();
        destroyed.then(
            move |_| {
                store.put_entries(keys, values, raw_keys, on_destroyed);
                None
            },
            move |err| {
                on_failed.resolve_failure(err.clone());
                None
            },
        );
        backend.destroy(self, destroyed);
    }

    fn put_entries(&self, keys: Vec<Value>, values: Vec<Value>, raw_keys: Vec<String>, deferred: StoreDeferred) {
        if keys.is_empty() {
            return deferred.resolve_success(Reply::Entries { keys, values });
        }

        let group = Deferred::group(keys.len());
        deferred.bind_to(&group);

        let pairs = Rc::new((keys, values));
        for (i, raw_key) in raw_keys.into_iter().enumerate() {
            if !group.is_pending() {
                break;
            }
            let member: StoreDeferred = Deferred::new();
            let (on_stored, on_failed) = (group.clone(), group.clone());
            let written = Rc::clone(&pairs);
            member.then(
                move |_| {
                    on_stored.resolve_success_with(|| Reply::Entries {
                        keys: written.0.clone(),
                        values: written.1.clone(),
                    });
                    None
                },
                move |err| {
                    on_failed.resolve_failure(err.clone());
                    None
                },
            );
            let (key, value) = (pairs.0[i].clone(), pairs.1[i].clone());
            self.backend().put(self, key, value, raw_key, member);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("backend", &self.backend_name())
            .field("initialized", &self.initialized())
            .field("loaded", &self.loaded())
            .field("entries", &self.cache().len())
            .finish()
    }
}
