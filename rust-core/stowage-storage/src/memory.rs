// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage backend for Stowage.
//
// The store's indexed cache is the storage: nothing lives outside it and
// everything is lost when the store is dropped. Always available, always
// fully loaded. Intended for testing, development, and ephemeral data.

use serde_json::Value;

use crate::backend::{mirror_put, mirror_remove, Backend};
use crate::reply::{Reply, StoreDeferred};
use crate::store::Store;

/// A backend that keeps every entry in the store's own cache.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use stowage_storage::memory::MemoryBackend;
/// use stowage_storage::{Store, StoreOptions};
///
/// let store = Store::open_with(Rc::new(MemoryBackend::new()), StoreOptions::new("scratch"));
/// assert!(store.initialized());
/// assert!(store.loaded());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    /// Create a new in-memory backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn probe(&self) -> bool {
        true
    }

    fn init(&self, store: &Store, deferred: StoreDeferred) {
        store.set_loaded(true);
        store.complete_initialization(&deferred, Reply::Ready);
    }

    fn reload(&self, store: &Store, deferred: StoreDeferred) {
        store.finish_reload(&deferred);
    }

    fn put(&self, store: &Store, key: Value, value: Value, raw_key: String, deferred: StoreDeferred) {
        deferred.resolve_success(mirror_put(store, key, value, raw_key));
    }

    fn remove(
        &self,
        store: &Store,
        key: Value,
        raw_key: String,
        cached: Option<Value>,
        deferred: StoreDeferred,
    ) {
        deferred.resolve_success(mirror_remove(store, key, &raw_key, cached));
    }

    fn destroy(&self, store: &Store, deferred: StoreDeferred) {
        store.cache_mut().reset();
        deferred.resolve_success(Reply::Ready);
    }

    fn size(&self, store: &Store, deferred: StoreDeferred) {
        let size = store.cache().len();
        deferred.resolve_success(Reply::Size(size));
    }
}
