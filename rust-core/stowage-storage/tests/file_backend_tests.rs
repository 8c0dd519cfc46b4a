// SPDX-License-Identifier: PMPL-1.0-or-later
//! File backend tests for Stowage
//!
//! Persistence, lazy loading and collection isolation on a real file.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use stowage_storage::{
    Aggregate, BackendRegistry, FileBackend, Projection, QueryExt, Reply, Store, StoreDeferred,
    StoreOptions,
};
use tempfile::TempDir;

fn ok(deferred: StoreDeferred) -> Reply {
    deferred.outcome().unwrap().unwrap()
}

fn file_registry(dir: &TempDir) -> BackendRegistry {
    let mut registry = BackendRegistry::with_defaults();
    let backend = FileBackend::open(dir.path().join("stowage.json")).unwrap();
    registry.register(2, Rc::new(backend)).unwrap();
    registry
}

#[test]
fn test_file_backend_wins_over_memory() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);
    let store = Store::open(&registry, StoreOptions::new("todos")).unwrap();
    assert_eq!(store.backend_name(), "file");
}

#[test]
fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let registry = file_registry(&dir);
        let store = Store::open(&registry, StoreOptions::new("todos")).unwrap();
        ok(store.put(&1, &json!({"title": "write tests"})));
        ok(store.put(&2, &json!({"title": "ship"})));
        ok(store.remove(&2));
    }

    let registry = file_registry(&dir);
    let store = Store::open(&registry, StoreOptions::new("todos")).unwrap();
    assert!(store.loaded());
    assert_eq!(
        ok(store.all()),
        Reply::Entries {
            keys: vec![json!(1)],
            values: vec![json!({"title": "write tests"})],
        }
    );
}

#[test]
fn test_collections_are_isolated_by_prefix() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);

    let todos = Store::open(&registry, StoreOptions::new("todos")).unwrap();
    let notes = Store::open(&registry, StoreOptions::new("notes")).unwrap();

    ok(todos.put(&"k", &"todo"));
    ok(notes.put(&"k", &"note"));
    ok(todos.destroy());

    assert_eq!(ok(todos.size()), Reply::Size(0));
    assert_eq!(ok(notes.get(&"k")).value(), Some(&json!("note")));
}

#[test]
fn test_nested_prefixes_are_isolated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested.json");
    let backend = Rc::new(FileBackend::open(&path).unwrap());

    // "a-" is a prefix of "a-b-", and "a--" would read "-1" as JSON.
    let inner = Store::open_with(backend.clone(), StoreOptions::new("a-b"));
    let dashed = Store::open_with(backend.clone(), StoreOptions::new("a-"));
    ok(inner.put(&1, &"inner"));
    ok(dashed.put(&1, &"dashed"));

    // Eager reload sees nothing of the other stores.
    let outer = Store::open_with(backend.clone(), StoreOptions::new("a"));
    assert!(outer.initialized());
    assert_eq!(ok(outer.all()).len(), 0);

    // Lazy size counts only its own section.
    let lazy = Store::open_with(backend.clone(), StoreOptions::new("a").with_lazy(true));
    assert_eq!(ok(lazy.size()), Reply::Size(0));
    assert_eq!(ok(lazy.get(&1)).value(), None);

    // Destroy leaves the other stores alone, on disk too.
    ok(outer.put(&1, &"outer"));
    ok(outer.destroy());
    assert_eq!(ok(inner.get(&1)).value(), Some(&json!("inner")));

    let reopened = Rc::new(FileBackend::open(&path).unwrap());
    let inner = Store::open_with(reopened.clone(), StoreOptions::new("a-b"));
    let dashed = Store::open_with(reopened.clone(), StoreOptions::new("a-"));
    let outer = Store::open_with(reopened, StoreOptions::new("a"));
    assert_eq!(ok(inner.reload()).len(), 1);
    assert_eq!(ok(dashed.get(&1)).value(), Some(&json!("dashed")));
    assert_eq!(ok(outer.size()), Reply::Size(0));
}

#[test]
fn test_custom_prefix() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);

    let a = Store::open(&registry, StoreOptions::new("a").with_prefix("shared:")).unwrap();
    ok(a.put(&1, &"one"));

    let b = Store::open(&registry, StoreOptions::new("b").with_prefix("shared:")).unwrap();
    assert_eq!(ok(b.get(&1)).value(), Some(&json!("one")));
}

#[test]
fn test_lazy_store_fetches_on_demand() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lazy.json");

    {
        let backend = Rc::new(FileBackend::open(&path).unwrap());
        let store = Store::open_with(backend, StoreOptions::new("lazy"));
        ok(store.put(&"a", &1));
        ok(store.put(&"b", &2));
        ok(store.put(&"c", &3));
    }

    let backend = Rc::new(FileBackend::open(&path).unwrap());
    let store = Store::open_with(backend, StoreOptions::new("lazy").with_lazy(true));
    assert!(store.initialized());
    assert!(!store.loaded());
    assert!(store.cache().is_empty());

    // Cache miss goes to the file and is mirrored.
    assert_eq!(ok(store.get(&"a")).value(), Some(&json!(1)));
    assert_eq!(store.cache().len(), 1);

    // Unknown keys are absent, not errors.
    assert_eq!(ok(store.get(&"zzz")).value(), None);

    // Removing an entry that was never fetched still reports its value.
    assert_eq!(ok(store.remove(&"b")).value(), Some(&json!(2)));

    // Size asks the file while the cache is partial.
    assert_eq!(ok(store.size()), Reply::Size(2));
    assert!(!store.loaded());

    // `all` loads everything.
    assert_eq!(ok(store.all()).len(), 2);
    assert!(store.loaded());
}

#[test]
fn test_each_on_lazy_store_reloads_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("each.json");

    {
        let backend = Rc::new(FileBackend::open(&path).unwrap());
        let store = Store::open_with(backend, StoreOptions::new("e"));
        ok(store.put(&1, &"x"));
        ok(store.put(&2, &"y"));
    }

    let backend = Rc::new(FileBackend::open(&path).unwrap());
    let store = Store::open_with(backend, StoreOptions::new("e").with_lazy(true));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&seen);
    store.each(move |value, _| s.borrow_mut().push(value.clone()));

    assert_eq!(*seen.borrow(), vec![json!("x"), json!("y")]);
    assert!(store.loaded());
}

#[test]
fn test_queries_over_file_store() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);
    let store = Store::open(&registry, StoreOptions::new("people")).unwrap();

    ok(store.save(&json!({"id": "ada", "age": 36})));
    ok(store.save(&json!({"id": "alan", "age": 41})));
    ok(store.save(&json!({"id": "grace", "age": 85})));

    let older = ok(store.filter(|value, _| value["age"].as_u64().unwrap_or(0) > 40));
    assert_eq!(older.len(), 2);

    let ages = ok(store.select(Projection::Field("age".into())));
    assert_eq!(ages.len(), 3);

    let sorted = ok(store.sort(
        |a, b| a["age"].as_u64().cmp(&b["age"].as_u64()),
        true,
    ));
    let (keys, _) = sorted.entries().unwrap();
    assert_eq!(keys, &[json!("grace"), json!("alan"), json!("ada")]);
    assert_eq!(store.cache().keys()[0], json!("grace"));
}

#[test]
fn test_aggregates_over_lazy_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.json");

    {
        let backend = Rc::new(FileBackend::open(&path).unwrap());
        let store = Store::open_with(backend, StoreOptions::new("scores"));
        ok(store.save(&json!({"id": 1, "points": 3})));
        ok(store.save(&json!({"id": 2, "points": 9})));
        ok(store.save(&json!({"id": 3})));
    }

    let backend = Rc::new(FileBackend::open(&path).unwrap());
    let store = Store::open_with(backend, StoreOptions::new("scores").with_lazy(true));

    assert_eq!(ok(store.count("points")), Reply::Aggregate(json!(2)));
    assert!(store.loaded());
    assert_eq!(ok(store.sum("points")).value(), Some(&json!(12.0)));
    assert_eq!(ok(store.avg("points")).value(), Some(&json!(6.0)));
    assert_eq!(ok(store.min("points")).value(), Some(&json!(3.0)));
    assert_eq!(ok(store.max("points")).value(), Some(&json!(9.0)));
    assert_eq!(ok(store.aggregate("id", Aggregate::Count)).value(), Some(&json!(3)));
}
