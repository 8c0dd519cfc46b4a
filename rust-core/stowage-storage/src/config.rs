// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store configuration.
//!
//! Defaults:
//! - name: "" (the unnamed collection)
//! - key: "id" (record field used by `save` and `batch`)
//! - lazy: false (load everything at initialization)
//! - backend: none (automatic selection by priority)
//! - prefix: "{name}-"

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Options a store is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Collection name. Backends that share one physical store use it to
    /// keep collections apart.
    pub name: String,
    /// Record field holding a record's key.
    pub key: String,
    /// Fetch entries on demand instead of loading everything at startup.
    pub lazy: bool,
    /// Backend to request by name before falling back to automatic selection.
    pub backend: Option<String>,
    /// Raw-key prefix override for prefixed backends.
    pub prefix: Option<String>,
}

impl StoreOptions {
    /// Options for the collection `name`, everything else default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse options from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| StoreError::Encoding(format!("invalid store options: {err}")))
    }

    /// Use `field` as the record key field.
    pub fn with_key(mut self, field: impl Into<String>) -> Self {
        self.key = field.into();
        self
    }

    /// Enable or disable lazy loading.
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Request a backend by name.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Override the raw-key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// The effective raw-key prefix.
    pub fn raw_prefix(&self) -> String {
        match &self.prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}-", self.name),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            key: "id".to_string(),
            lazy: false,
            backend: None,
            prefix: None,
        }
    }
}
