// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stowage Storage Facade
//
// This crate puts several storage backends behind one deferred-result API.
// A `Store` picks a backend from a `BackendRegistry`, mirrors it into an
// `IndexedCache`, and holds every operation behind an initialization gate
// until the backend is ready, replaying queued calls in order afterwards.
//
// # Modules
//
// - [`store`] -- The `Store` facade: get/put/remove/batch/reset and friends.
// - [`backend`] -- The `Backend` trait every storage facility implements.
// - [`registry`] -- Backend catalogue, priority selection, and plugins.
// - [`gate`] -- The initialization gate and its pending queue.
// - [`cache`] -- The swap-remove indexed cache used as the local mirror.
// - [`memory`] -- Backend that keeps everything in the cache.
// - [`file`] -- Backend persisting to one JSON file.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
// - [`query`] -- Filter, select, sort and aggregate over a whole store.
// - [`config`] -- `StoreOptions`.
// - [`error`] -- The `StoreError` enum covering every failure mode.
//
// # Example
//
// ```rust
// use stowage_storage::{BackendRegistry, QueryExt, Reply, Store, StoreOptions};
//
// let registry = BackendRegistry::with_defaults();
// let store = Store::open(&registry, StoreOptions::new("people")).unwrap();
//
// store.save(&serde_json::json!({"id": 1, "name": "Ada"}));
// store.save(&serde_json::json!({"id": 2, "name": "Grace"}));
//
// let adults = store.filter(|value, _key| value["name"] == "Ada");
// assert_eq!(adults.outcome().unwrap().unwrap().len(), 1);
// ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod file;
pub mod gate;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod registry;
pub mod reply;
pub mod store;

// Optional persistent backends, feature-gated to keep the default build lean.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::Backend;
pub use cache::IndexedCache;
pub use config::StoreOptions;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use metrics::{BackendStats, MetricsBackend};
pub use query::{Aggregate, Projection, QueryExt};
pub use registry::{BackendDescriptor, BackendRegistry, Plugin};
pub use reply::{Reply, StoreDeferred};
pub use store::Store;
pub use stowage_deferred::{Deferred, State};

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
