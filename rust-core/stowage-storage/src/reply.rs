// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Success payloads of store operations.

use serde_json::Value;
use stowage_deferred::Deferred;

use crate::error::StoreError;

/// The deferred result every store operation hands back.
pub type StoreDeferred = Deferred<Reply, StoreError>;

/// What a store operation succeeded with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The operation completed without a payload (`init`, `destroy`).
    Ready,
    /// A single lookup or removal. `value` is `None` when the key was absent.
    Entry {
        /// Original key.
        key: Value,
        /// Value found (or removed).
        value: Option<Value>,
    },
    /// A write, with the value it replaced.
    Stored {
        /// Original key.
        key: Value,
        /// Value written.
        value: Value,
        /// Value previously mirrored under this key.
        previous: Option<Value>,
    },
    /// A saved record, with its key field filled in.
    Record(Value),
    /// A batch of saved records, in input order.
    Records(Vec<Value>),
    /// Per-key results of `get_many` / `remove_many`, in input order.
    Lookups {
        /// Original keys.
        keys: Vec<Value>,
        /// Values found, `None` where absent.
        values: Vec<Option<Value>>,
    },
    /// Every pair of a collection (`all`, `reload`, `reset`, queries).
    Entries {
        /// Original keys.
        keys: Vec<Value>,
        /// Values, aligned with `keys`.
        values: Vec<Value>,
    },
    /// Number of entries.
    Size(usize),
    /// Result of an aggregation over one field; `Null` when no value
    /// qualified.
    Aggregate(Value),
}

impl Reply {
    /// The single value carried by `Entry`, `Stored`, `Record` or
    /// `Aggregate`.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Reply::Entry { value, .. } => value.as_ref(),
            Reply::Stored { value, .. } => Some(value),
            Reply::Record(record) => Some(record),
            Reply::Aggregate(result) => Some(result),
            _ => None,
        }
    }

    /// The count carried by `Size`.
    pub fn size(&self) -> Option<usize> {
        match self {
            Reply::Size(size) => Some(*size),
            _ => None,
        }
    }

    /// Keys and values carried by `Entries`.
    pub fn entries(&self) -> Option<(&[Value], &[Value])> {
        match self {
            Reply::Entries { keys, values } => Some((keys, values)),
            _ => None,
        }
    }

    /// Records carried by `Records`.
    pub fn records(&self) -> Option<&[Value]> {
        match self {
            Reply::Records(records) => Some(records),
            _ => None,
        }
    }

    /// Number of items carried by `Entries`, `Lookups` or `Records`.
    pub fn len(&self) -> usize {
        match self {
            Reply::Entries { values, .. } => values.len(),
            Reply::Lookups { values, .. } => values.len(),
            Reply::Records(records) => records.len(),
            _ => 0,
        }
    }

    /// True when [`Reply::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
