// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store error types for Stowage.
//
// One enum covers every failure a store operation can report: encoding
// failures caught while preparing arguments, backend failures (I/O, corrupted
// data, unavailability, quota), and backend selection failures. Errors travel
// as failure payloads of deferred results and are handed to every failure
// listener, so the enum is `Clone`; I/O errors are held behind an `Arc`.

use std::sync::Arc;

use thiserror::Error;

/// Result alias used throughout the storage crate.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when interacting with a store or its backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    /// A key or value could not be represented as a JSON document.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A record handed to `save` or `batch` is not a JSON object.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// `reset` was given a different number of keys and values.
    #[error("mismatched reset input: {keys} keys for {values} values")]
    MismatchedLengths {
        /// Number of keys supplied.
        keys: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not available (e.g., file cannot be opened).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A write would grow the backend beyond its configured quota.
    #[error("quota exceeded: {size} bytes (max: {max})")]
    QuotaExceeded {
        /// Size in bytes the backend would have after the write.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// No registered backend passed its capability probe.
    #[error("no storage backend is available")]
    NoBackendAvailable,

    /// A backend with this name is already registered.
    #[error("backend already registered: {0}")]
    DuplicateBackend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Arc::new(err))
    }
}

// `io::Error` has no equality; two I/O errors match on kind and message.
impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        use StoreError::*;
        match (self, other) {
            (Io(a), Io(b)) => a.kind() == b.kind() && a.to_string() == b.to_string(),
            (Encoding(a), Encoding(b))
            | (InvalidRecord(a), InvalidRecord(b))
            | (CorruptedData(a), CorruptedData(b))
            | (BackendUnavailable(a), BackendUnavailable(b))
            | (DuplicateBackend(a), DuplicateBackend(b)) => a == b,
            (
                MismatchedLengths { keys: k1, values: v1 },
                MismatchedLengths { keys: k2, values: v2 },
            ) => k1 == k2 && v1 == v2,
            (QuotaExceeded { size: s1, max: m1 }, QuotaExceeded { size: s2, max: m2 }) => {
                s1 == s2 && m1 == m2
            }
            (NoBackendAvailable, NoBackendAvailable) => true,
            _ => false,
        }
    }
}

impl StoreError {
    /// Wrap a serde failure raised while encoding a key or value.
    pub fn encoding(err: impl std::fmt::Display) -> Self {
        StoreError::Encoding(err.to_string())
    }

    /// Wrap a serde failure raised while decoding stored data.
    pub fn corrupted(err: impl std::fmt::Display) -> Self {
        StoreError::CorruptedData(err.to_string())
    }
}
