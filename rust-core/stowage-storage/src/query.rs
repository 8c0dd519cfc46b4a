// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Query and aggregation helpers over a store's full contents.
//
// Each helper waits for initialization and fetches every pair (from the
// cache when it is a complete mirror, otherwise through a reload). Queries
// answer with a `Reply::Entries`, aggregations with a `Reply::Aggregate`.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use stowage_deferred::Deferred;

use crate::reply::{Reply, StoreDeferred};
use crate::store::Store;

/// Which object fields [`QueryExt::select`] keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// The value of one field, for objects that have it.
    Field(String),
    /// An object of the listed fields, for objects that have at least one.
    Fields(Vec<String>),
}

impl Projection {
    /// Project `value`, or `None` if it does not qualify.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        let object = value.as_object()?;
        match self {
            Projection::Field(field) => object.get(field).cloned(),
            Projection::Fields(fields) => {
                let picked: Map<String, Value> = fields
                    .iter()
                    .filter_map(|f| object.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                (!picked.is_empty()).then_some(Value::Object(picked))
            }
        }
    }
}

/// How [`QueryExt::aggregate`] folds the numbers found under a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Objects that have the field, whatever its value.
    Count,
    /// Sum of the numeric values.
    Sum,
    /// Mean of the numeric values.
    Avg,
    /// Smallest numeric value.
    Min,
    /// Largest numeric value.
    Max,
}

impl Aggregate {
    /// Fold the field values of every object in `values` that has `field`.
    ///
    /// `Count` is an integer. The others only look at numbers and are `Null`
    /// when there were none, except `Sum`, which is zero.
    pub fn apply<'a, I>(self, field: &str, values: I) -> Value
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let found = values
            .into_iter()
            .filter_map(|value| value.as_object()?.get(field));

        if self == Aggregate::Count {
            return Value::from(found.count());
        }

        let numbers: Vec<f64> = found.filter_map(Value::as_f64).collect();
        let result = match self {
            Aggregate::Sum => Some(numbers.iter().sum()),
            Aggregate::Avg if numbers.is_empty() => None,
            Aggregate::Avg => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
            Aggregate::Min => numbers.iter().copied().reduce(f64::min),
            Aggregate::Max => numbers.iter().copied().reduce(f64::max),
            Aggregate::Count => None,
        };
        result.map_or(Value::Null, Value::from)
    }
}

/// Filtering, projection, sorting and aggregation on a [`Store`].
pub trait QueryExt {
    /// Pairs for which `predicate(value, key)` holds.
    fn filter<P>(&self, predicate: P) -> StoreDeferred
    where
        P: FnMut(&Value, &Value) -> bool + 'static;

    /// Projected values of every qualifying pair, with their keys.
    fn select(&self, projection: Projection) -> StoreDeferred;

    /// Sort the store's cache by value, then answer with every pair in the
    /// new order. `descending` reverses the sorted order. The sorted order
    /// replaces the cache once the comparator is done.
    fn sort<C>(&self, comparator: C, descending: bool) -> StoreDeferred
    where
        C: FnMut(&Value, &Value) -> Ordering + 'static;

    /// Fold `field` across every object value of the store.
    fn aggregate(&self, field: &str, aggregate: Aggregate) -> StoreDeferred;

    /// Number of object values that have `field`.
    fn count(&self, field: &str) -> StoreDeferred {
        self.aggregate(field, Aggregate::Count)
    }

    /// Sum of the numbers under `field`.
    fn sum(&self, field: &str) -> StoreDeferred {
        self.aggregate(field, Aggregate::Sum)
    }

    /// Mean of the numbers under `field`.
    fn avg(&self, field: &str) -> StoreDeferred {
        self.aggregate(field, Aggregate::Avg)
    }

    /// Smallest number under `field`.
    fn min(&self, field: &str) -> StoreDeferred {
        self.aggregate(field, Aggregate::Min)
    }

    /// Largest number under `field`.
    fn max(&self, field: &str) -> StoreDeferred {
        self.aggregate(field, Aggregate::Max)
    }
}

/// Run `finish` on every pair of `store` once they are all available.
fn with_all<F>(store: &Store, label: &'static str, finish: F) -> StoreDeferred
where
    F: FnOnce(&Store, Vec<Value>, Vec<Value>) -> Reply + 'static,
{
    store.gated(label, Deferred::new(), move |store, deferred| {
        let all = store.all();
        let target = store.clone();
        let failed = deferred.clone();
        all.then(
            move |reply| {
                if let Reply::Entries { keys, values } = reply {
                    deferred.resolve_success(finish(&target, keys.clone(), values.clone()));
                }
                None
            },
            move |err| {
                failed.resolve_failure(err.clone());
                None
            },
        );
    })
}

impl QueryExt for Store {
    fn filter<P>(&self, mut predicate: P) -> StoreDeferred
    where
        P: FnMut(&Value, &Value) -> bool + 'static,
    {
        with_all(self, "filter", move |_, keys, values| {
            let (keys, values) = keys
                .into_iter()
                .zip(values)
                .filter(|(key, value)| predicate(value, key))
                .unzip();
            Reply::Entries { keys, values }
        })
    }

    fn select(&self, projection: Projection) -> StoreDeferred {
        with_all(self, "select", move |_, keys, values| {
            let (keys, values) = keys
                .into_iter()
                .zip(values)
                .filter_map(|(key, value)| projection.apply(&value).map(|v| (key, v)))
                .unzip();
            Reply::Entries { keys, values }
        })
    }

    fn sort<C>(&self, comparator: C, descending: bool) -> StoreDeferred
    where
        C: FnMut(&Value, &Value) -> Ordering + 'static,
    {
        with_all(self, "sort", move |store, _, _| {
            // Sorted on a copy so the comparator may call back into the store.
            let mut sorted = store.cache().clone();
            sorted.sort_by(comparator);
            if descending {
                sorted.reverse();
            }
            store.cache_mut().overwrite(sorted);
            store.snapshot()
        })
    }

    fn aggregate(&self, field: &str, aggregate: Aggregate) -> StoreDeferred {
        let field = field.to_string();
        with_all(self, "aggregate", move |_, _, values| {
            Reply::Aggregate(aggregate.apply(&field, &values))
        })
    }
}
