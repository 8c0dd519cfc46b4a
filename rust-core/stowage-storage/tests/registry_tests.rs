// SPDX-License-Identifier: PMPL-1.0-or-later
//! Backend registry and selection tests for Stowage

use std::cell::Cell;
use std::rc::Rc;

use serde_json::Value;
use stowage_storage::backend::{mirror_put, mirror_remove};
use stowage_storage::{
    Backend, BackendRegistry, Reply, Store, StoreDeferred, StoreError, StoreOptions,
};

/// Memory-like backend with a switchable probe.
struct StubBackend {
    name: &'static str,
    available: Cell<bool>,
    probes: Cell<usize>,
}

impl StubBackend {
    fn new(name: &'static str, available: bool) -> Rc<Self> {
        Rc::new(Self {
            name,
            available: Cell::new(available),
            probes: Cell::new(0),
        })
    }
}

impl Backend for StubBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn probe(&self) -> bool {
        self.probes.set(self.probes.get() + 1);
        self.available.get()
    }

    fn reload(&self, store: &Store, deferred: StoreDeferred) {
        store.set_loaded(true);
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
}

fn registry(backends: &[(i32, &Rc<StubBackend>)]) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for (priority, backend) in backends {
        let backend: Rc<dyn Backend> = Rc::clone(*backend) as Rc<dyn Backend>;
        registry.register(*priority, backend).unwrap();
    }
    registry
}

#[test]
fn test_automatic_selection_prefers_priority() {
    let a = StubBackend::new("a", true);
    let b = StubBackend::new("b", true);
    let registry = registry(&[(5, &a), (8, &b)]);

    assert_eq!(registry.select(None).unwrap().name(), "b");
    assert_eq!(registry.chosen().map(|c| c.name().to_string()).as_deref(), Some("b"));
}

#[test]
fn test_explicit_name_before_automatic_selection() {
    let a = StubBackend::new("a", true);
    let b = StubBackend::new("b", true);
    let registry = registry(&[(5, &a), (8, &b)]);

    assert_eq!(registry.select(Some("a")).unwrap().name(), "a");
    // Explicit choices are not memoized.
    assert!(registry.chosen().is_none());
}

#[test]
fn test_automatic_selection_skips_failed_probes() {
    let a = StubBackend::new("a", true);
    let b = StubBackend::new("b", false);
    let registry = registry(&[(5, &a), (8, &b)]);

    assert_eq!(registry.select(None).unwrap().name(), "a");
    assert_eq!(b.probes.get(), 1);
}

#[test]
fn test_ties_go_to_earlier_registration() {
    let first = StubBackend::new("first", true);
    let second = StubBackend::new("second", true);
    let registry = registry(&[(3, &first), (3, &second)]);

    assert_eq!(registry.select(None).unwrap().name(), "first");
}

#[test]
fn test_memoized_choice_overrides_unsatisfied_request() {
    let a = StubBackend::new("a", true);
    let b = StubBackend::new("b", true);
    let registry = registry(&[(5, &a), (8, &b)]);

    assert_eq!(registry.select(None).unwrap().name(), "b");

    // Unknown name: the memoized choice answers.
    assert_eq!(registry.select(Some("missing")).unwrap().name(), "b");

    // Known name whose probe fails: the memoized choice still answers.
    a.available.set(false);
    assert_eq!(registry.select(Some("a")).unwrap().name(), "b");

    // A satisfiable explicit request still wins.
    a.available.set(true);
    assert_eq!(registry.select(Some("a")).unwrap().name(), "a");
}

#[test]
fn test_memoized_choice_is_not_probed_again() {
    let b = StubBackend::new("b", true);
    let registry = registry(&[(8, &b)]);

    registry.select(None).unwrap();
    b.available.set(false);
    assert_eq!(registry.select(None).unwrap().name(), "b");
    assert_eq!(b.probes.get(), 1);
}

#[test]
fn test_registries_do_not_share_memo() {
    let a = StubBackend::new("a", true);
    let b = StubBackend::new("b", true);

    let first = registry(&[(5, &a), (8, &b)]);
    let second = registry(&[(9, &a), (8, &b)]);

    assert_eq!(first.select(None).unwrap().name(), "b");
    assert_eq!(second.select(None).unwrap().name(), "a");
}

#[test]
fn test_no_backend_available() {
    let a = StubBackend::new("a", false);
    let registry = registry(&[(5, &a)]);

    assert!(matches!(registry.select(None), Err(StoreError::NoBackendAvailable)));
    assert!(matches!(
        Store::open(&registry, StoreOptions::new("none")),
        Err(StoreError::NoBackendAvailable)
    ));
    assert!(matches!(
        BackendRegistry::new().select(Some("a")),
        Err(StoreError::NoBackendAvailable)
    ));
}

#[test]
fn test_duplicate_names_rejected() {
    let a = StubBackend::new("a", true);
    let again = StubBackend::new("a", true);
    let mut registry = registry(&[(5, &a)]);

    let err = registry.register(1, again).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateBackend(name) if name == "a"));
    assert_eq!(registry.descriptors().len(), 1);
}

#[test]
fn test_defaults_hold_memory_backend() {
    let registry = BackendRegistry::with_defaults();
    let descriptors = registry.descriptors();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].name, "memory");
    assert_eq!(descriptors[0].priority, 1);
}

#[test]
fn test_store_uses_requested_backend() {
    let a = StubBackend::new("a", true);
    let b = StubBackend::new("b", true);
    let registry = registry(&[(5, &a), (8, &b)]);

    let store = Store::open(&registry, StoreOptions::new("s").with_backend("a")).unwrap();
    assert_eq!(store.backend_name(), "a");
    assert!(store.initialized());

    let store = Store::open(&registry, StoreOptions::new("s")).unwrap();
    assert_eq!(store.backend_name(), "b");
}

#[test]
fn test_plugins_run_in_order_before_init() {
    let a = StubBackend::new("a", true);
    let mut registry = registry(&[(1, &a)]);
    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));

    for tag in ["first", "second"] {
        let seen = Rc::clone(&seen);
        registry.add_plugin(move |store: &Store| {
            seen.borrow_mut().push((tag, store.initialized()));
        });
    }

    Store::open(&registry, StoreOptions::new("p")).unwrap();
    assert_eq!(*seen.borrow(), vec![("first", false), ("second", false)]);
    assert_eq!(registry.plugins().len(), 2);
}
