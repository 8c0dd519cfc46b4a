// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage backend contract for Stowage.
//
// A store never touches a storage facility directly. It holds one backend
// through the `Backend` trait and hands it the store itself plus the deferred
// to resolve. Backends perform their I/O, mirror every successful change into
// the store's indexed cache exactly as the facade would, and report failures
// by resolving the deferred through its failure channel, never by panicking.

use serde_json::Value;
use stowage_deferred::Deferred;

use crate::error::{StoreError, StoreResult};
use crate::reply::{Reply, StoreDeferred};
use crate::store::Store;

/// A pluggable storage facility behind a [`Store`].
///
/// Keys arrive in two forms: the caller's original key (`key`) and the raw
/// key produced by [`Backend::encode_key`], which is what the indexed cache
/// and the facility itself are addressed by.
///
/// Backends are single-threaded. All methods run on the caller's turn and
/// may resolve `deferred` before returning.
pub trait Backend {
    /// Unique name used for explicit selection and in logs.
    fn name(&self) -> &str;

    /// Capability probe. May perform a harmless round-trip.
    fn probe(&self) -> bool;

    /// Encode an original key into its raw form.
    ///
    /// Defaults to the key's compact JSON text.
    fn encode_key(&self, _store: &Store, key: &Value) -> StoreResult<String> {
        serde_json::to_string(key).map_err(StoreError::encoding)
    }

    /// Prepare the facility for `store` and start initialization.
    ///
    /// The default finishes immediately for lazy stores and otherwise loads
    /// everything through [`Backend::reload`], which completes the store's
    /// initialization once the cache is filled.
    fn init(&self, store: &Store, deferred: StoreDeferred) {
        if store.options().lazy {
            store.complete_initialization(&deferred, Reply::Ready);
        } else {
            let reload = Deferred::new();
            deferred.bind_to_with(&reload, |_| Reply::Ready);
            self.reload(store, reload);
        }
    }

    /// Load every entry of the store into its cache, mark the store loaded,
    /// and finish through [`Store::finish_reload`].
    fn reload(&self, store: &Store, deferred: StoreDeferred);

    /// Fetch one entry on a cache miss. Only called while the store is not
    /// fully loaded; resolves with [`Reply::Entry`].
    fn get(&self, store: &Store, key: Value, raw_key: String, deferred: StoreDeferred) {
        let _ = (store, key, raw_key, deferred);
        unimplemented!("backend `{}` does not fetch single entries", self.name())
    }

    /// Write one entry; resolves with [`Reply::Stored`].
    fn put(&self, store: &Store, key: Value, value: Value, raw_key: String, deferred: StoreDeferred);

    /// Remove one entry; resolves with [`Reply::Entry`] carrying the removed
    /// value. `cached` is what the cache held for the key, if anything.
    fn remove(
        &self,
        store: &Store,
        key: Value,
        raw_key: String,
        cached: Option<Value>,
        deferred: StoreDeferred,
    );

    /// Remove every entry of the store and clear its cache; resolves with
    /// [`Reply::Ready`].
    fn destroy(&self, store: &Store, deferred: StoreDeferred);

    /// Count the entries of a store that is not fully loaded; resolves with
    /// [`Reply::Size`]. The default reloads and counts.
    fn size(&self, store: &Store, deferred: StoreDeferred) {
        let reload = Deferred::new();
        deferred.bind_to_with(&reload, |reply| Reply::Size(reply.len()));
        self.reload(store, reload);
    }
}

/// Encode `key` as `prefix` followed by its JSON text.
pub fn encode_prefixed(prefix: &str, key: &Value) -> StoreResult<String> {
    let json = serde_json::to_string(key).map_err(StoreError::encoding)?;
    Ok(format!("{prefix}{json}"))
}

/// Recover the original key from a raw key produced by [`encode_prefixed`].
pub fn decode_prefixed(prefix: &str, raw_key: &str) -> StoreResult<Value> {
    let json = raw_key.strip_prefix(prefix).ok_or_else(|| {
        StoreError::CorruptedData(format!("raw key {raw_key:?} lacks prefix {prefix:?}"))
    })?;
    serde_json::from_str(json).map_err(StoreError::corrupted)
}

/// Mirror a successful write into the store's cache and build its reply.
pub fn mirror_put(store: &Store, key: Value, value: Value, raw_key: String) -> Reply {
    let previous = store
        .cache_mut()
        .put(raw_key, value.clone(), key.clone());
    Reply::Stored {
        key,
        value,
        previous,
    }
}

/// Mirror a successful removal into the store's cache and build its reply.
///
/// Prefers the value the cache held; falls back to `fetched`.
pub fn mirror_remove(store: &Store, key: Value, raw_key: &str, fetched: Option<Value>) -> Reply {
    let removed = store.cache_mut().remove(raw_key).map(|(value, _)| value);
    Reply::Entry {
        key,
        value: removed.or(fetched),
    }
}
