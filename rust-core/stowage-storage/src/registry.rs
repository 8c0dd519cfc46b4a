// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend registry and selector.
//
// An append-only catalogue of backends with priorities, plus the plugins to
// run on every store opened through it. Selection state lives in the
// registry value, so independent registries never see each other's choices.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};

use crate::backend::Backend;
use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBackend;
use crate::store::Store;

/// A plugin: runs on a fully wired store before initialization starts.
pub type Plugin = Rc<dyn Fn(&Store)>;

/// A registered backend.
#[derive(Clone)]
pub struct BackendDescriptor {
    /// Backend name, unique within a registry.
    pub name: String,
    /// Higher is preferred during automatic selection.
    pub priority: i32,
    /// The backend itself.
    pub backend: Rc<dyn Backend>,
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Catalogue of backends and plugins.
#[derive(Default)]
pub struct BackendRegistry {
    descriptors: Vec<BackendDescriptor>,
    chosen: OnceCell<Rc<dyn Backend>>,
    plugins: Vec<Plugin>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the in-memory backend at priority 1.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .descriptors
            .push(Self::describe(1, Rc::new(MemoryBackend::new())));
        registry
    }

    fn describe(priority: i32, backend: Rc<dyn Backend>) -> BackendDescriptor {
        BackendDescriptor {
            name: backend.name().to_string(),
            priority,
            backend,
        }
    }

    /// Add `backend` with `priority`. Names must be unique.
    pub fn register(&mut self, priority: i32, backend: Rc<dyn Backend>) -> StoreResult<()> {
        if self.descriptors.iter().any(|d| d.name == backend.name()) {
            return Err(StoreError::DuplicateBackend(backend.name().to_string()));
        }
        debug!(backend = backend.name(), priority, "backend registered");
        self.descriptors.push(Self::describe(priority, backend));
        Ok(())
    }

    /// Add a plugin run on every store opened through this registry.
    pub fn add_plugin<P>(&mut self, plugin: P)
    where
        P: Fn(&Store) + 'static,
    {
        self.plugins.push(Rc::new(plugin));
    }

    /// Registered plugins, in registration order.
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Registered backends, in registration order.
    pub fn descriptors(&self) -> &[BackendDescriptor] {
        &self.descriptors
    }

    /// The memoized automatic choice, if one has been made.
    pub fn chosen(&self) -> Option<&Rc<dyn Backend>> {
        self.chosen.get()
    }

    /// Pick a backend.
    ///
    /// A requested name wins if a backend with that name is registered and
    /// its probe passes; such a choice is not memoized. Otherwise automatic
    /// selection applies: once an automatic choice has been made it is
    /// returned for every later call, even when a different name was
    /// requested and could not be satisfied. The first automatic choice is
    /// the highest-priority backend whose probe passes, ties going to the
    /// earlier registration.
    pub fn select(&self, requested: Option<&str>) -> StoreResult<Rc<dyn Backend>> {
        if let Some(name) = requested {
            let explicit = self
                .descriptors
                .iter()
                .find(|d| d.name == name && d.backend.probe());
            if let Some(descriptor) = explicit {
                debug!(backend = name, "backend selected by name");
                return Ok(Rc::clone(&descriptor.backend));
            }
        }

        if let Some(chosen) = self.chosen.get() {
            return Ok(Rc::clone(chosen));
        }

        let mut ranked: Vec<&BackendDescriptor> = self.descriptors.iter().collect();
        ranked.sort_by(|a, b| b.priority.cmp(&a.priority));

        let descriptor = ranked
            .into_iter()
            .find(|d| d.backend.probe())
            .ok_or(StoreError::NoBackendAvailable)?;

        info!(
            backend = %descriptor.name,
            priority = descriptor.priority,
            "storage backend selected"
        );
        let chosen = self.chosen.get_or_init(|| Rc::clone(&descriptor.backend));
        Ok(Rc::clone(chosen))
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("descriptors", &self.descriptors)
            .field("chosen", &self.chosen.get().map(|b| b.name().to_string()))
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
