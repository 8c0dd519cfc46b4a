// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for Stowage backends.
//
// Wraps any `Backend` and transparently counts operations, failures, and
// bytes written. Counts are taken when a backend call is issued; failures
// and bytes are recorded when the call's deferred resolves.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::backend::Backend;
use crate::error::StoreResult;
use crate::reply::StoreDeferred;
use crate::store::Store;

/// Accumulated statistics for a backend.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsBackend`] that owns them, until [`MetricsBackend::reset_stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Number of `init` calls.
    pub init_count: u64,
    /// Number of `reload` calls.
    pub reload_count: u64,
    /// Number of `get` calls (cache misses on lazy stores).
    pub get_count: u64,
    /// Number of `put` calls.
    pub put_count: u64,
    /// Number of `remove` calls.
    pub remove_count: u64,
    /// Number of `destroy` calls.
    pub destroy_count: u64,
    /// Number of `size` calls.
    pub size_count: u64,
    /// Number of calls that resolved through the failure channel.
    pub failure_count: u64,
    /// Raw key and JSON value bytes of every successful `put`.
    pub total_bytes_written: u64,
}

/// A backend wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use stowage_storage::memory::MemoryBackend;
/// use stowage_storage::metrics::MetricsBackend;
/// use stowage_storage::{Store, StoreOptions};
///
/// let metered = Rc::new(MetricsBackend::new(MemoryBackend::new()));
/// let store = Store::open_with(metered.clone(), StoreOptions::new("m"));
///
/// store.put(&"key", &"value");
/// store.get(&"key");
///
/// let stats = metered.stats();
/// assert_eq!(stats.init_count, 1);
/// assert_eq!(stats.put_count, 1);
/// assert_eq!(stats.get_count, 0); // served from the cache
/// ```
pub struct MetricsBackend<B: Backend> {
    /// The wrapped backend that performs the actual storage operations.
    inner: B,
    /// Shared, mutable statistics accumulator.
    stats: Rc<RefCell<BackendStats>>,
}

impl<B: Backend> MetricsBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: Rc::new(RefCell::new(BackendStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub fn stats(&self) -> BackendStats {
        self.stats.borrow().clone()
    }

    /// A handle on the live statistics, for observers that outlive a borrow
    /// of the backend.
    pub fn shared_stats(&self) -> Rc<RefCell<BackendStats>> {
        Rc::clone(&self.stats)
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&self) {
        *self.stats.borrow_mut() = BackendStats::default();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn record<F>(&self, deferred: &StoreDeferred, count: F)
    where
        F: FnOnce(&mut BackendStats),
    {
        count(&mut *self.stats.borrow_mut());
        let stats = Rc::clone(&self.stats);
        deferred.on_failure(move |_| {
            stats.borrow_mut().failure_count += 1;
            None
        });
    }
}

impl<B: Backend> Backend for MetricsBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn probe(&self) -> bool {
        self.inner.probe()
    }

    fn encode_key(&self, store: &Store, key: &Value) -> StoreResult<String> {
        self.inner.encode_key(store, key)
    }

    fn init(&self, store: &Store, deferred: StoreDeferred) {
        self.record(&deferred, |s| s.init_count += 1);
        self.inner.init(store, deferred);
    }

    fn reload(&self, store: &Store, deferred: StoreDeferred) {
        self.record(&deferred, |s| s.reload_count += 1);
        self.inner.reload(store, deferred);
    }

    fn get(&self, store: &Store, key: Value, raw_key: String, deferred: StoreDeferred) {
        self.record(&deferred, |s| s.get_count += 1);
        self.inner.get(store, key, raw_key, deferred);
    }

    fn put(&self, store: &Store, key: Value, value: Value, raw_key: String, deferred: StoreDeferred) {
        self.record(&deferred, |s| s.put_count += 1);

        let bytes = raw_key.len() + value.to_string().len();
        let stats = Rc::clone(&self.stats);
        deferred.on_success(move |_| {
            stats.borrow_mut().total_bytes_written += bytes as u64;
            None
        });

        self.inner.put(store, key, value, raw_key, deferred);
    }

    fn remove(
        &self,
        store: &Store,
        key: Value,
        raw_key: String,
        cached: Option<Value>,
        deferred: StoreDeferred,
    ) {
        self.record(&deferred, |s| s.remove_count += 1);
        self.inner.remove(store, key, raw_key, cached, deferred);
    }

    fn destroy(&self, store: &Store, deferred: StoreDeferred) {
        self.record(&deferred, |s| s.destroy_count += 1);
        self.inner.destroy(store, deferred);
    }

    fn size(&self, store: &Store, deferred: StoreDeferred) {
        self.record(&deferred, |s| s.size_count += 1);
        self.inner.size(store, deferred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::memory::MemoryBackend;
    use crate::reply::Reply;

    fn metered() -> (Rc<MetricsBackend<MemoryBackend>>, Store) {
        let backend = Rc::new(MetricsBackend::new(MemoryBackend::new()));
        let store = Store::open_with(backend.clone(), StoreOptions::new("metrics"));
        (backend, store)
    }

    #[test]
    fn test_counts_operations() {
        let (backend, store) = metered();

        store.put(&"a", &1);
        store.put(&"b", &2);
        store.remove(&"a");
        store.remove(&"missing");
        store.destroy();

        let stats = backend.stats();
        assert_eq!(stats.init_count, 1);
        assert_eq!(stats.put_count, 2);
        // The loaded cache answers for the missing key.
        assert_eq!(stats.remove_count, 1);
        assert_eq!(stats.destroy_count, 1);
        assert_eq!(stats.failure_count, 0);
    }

    #[test]
    fn test_bytes_written() {
        let (backend, store) = metered();
        store.put(&"k", &"v");
        // raw key `"k"` (3 bytes) + value `"v"` (3 bytes)
        assert_eq!(backend.stats().total_bytes_written, 6);
    }

    #[test]
    fn test_size_served_from_cache() {
        let (backend, store) = metered();
        store.put(&1, &1);
        assert_eq!(store.size().outcome(), Some(Ok(Reply::Size(1))));
        assert_eq!(backend.stats().size_count, 0);
    }

    #[test]
    fn test_reset_stats() {
        let (backend, store) = metered();
        store.put(&1, &1);
        let shared = backend.shared_stats();
        backend.reset_stats();
        assert_eq!(backend.stats(), BackendStats::default());
        assert_eq!(shared.borrow().put_count, 0);
    }

    #[test]
    fn test_name_and_inner() {
        let backend = MetricsBackend::new(MemoryBackend::new());
        assert_eq!(backend.name(), "memory");
        assert!(backend.probe());
        assert_eq!(backend.inner().name(), "memory");
    }
}
