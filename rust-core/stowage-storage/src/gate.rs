// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Initialization gate and pending queue.
//
// Until a store finishes initializing, every facade operation is recorded
// here instead of reaching the backend. The caller still gets a live
// deferred back immediately. Opening the gate hands the queue out exactly
// once, in call order; after that the queue is gone for good.

use std::fmt;

use stowage_deferred::Deferred;
use tracing::debug;

type Run<S, T, E> = Box<dyn FnOnce(&S, Deferred<T, E>)>;

/// One facade call recorded before initialization completed.
pub struct PendingOperation<S, T, E> {
    label: &'static str,
    deferred: Deferred<T, E>,
    run: Run<S, T, E>,
}

impl<S, T, E> PendingOperation<S, T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Record `run` as the body of the operation named `label`, answering
    /// through `deferred`.
    pub fn new<F>(label: &'static str, deferred: Deferred<T, E>, run: F) -> Self
    where
        F: FnOnce(&S, Deferred<T, E>) + 'static,
    {
        Self {
            label,
            deferred,
            run: Box::new(run),
        }
    }

    /// Name of the facade operation.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The deferred handed back to the original caller.
    pub fn deferred(&self) -> &Deferred<T, E> {
        &self.deferred
    }

    /// Run the operation against `target` with its own deferred.
    pub fn dispatch(self, target: &S) {
        (self.run)(target, self.deferred);
    }

    /// Re-run the operation against `target` with a fresh deferred and bind
    /// the caller's deferred to it.
    pub fn replay(self, target: &S) {
        let fresh = self.deferred.renewed();
        (self.run)(target, fresh.clone());
        self.deferred.bind_to(&fresh);
    }
}

impl<S, T, E> fmt::Debug for PendingOperation<S, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Holds operations back until initialization completes.
pub struct InitGate<S, T, E> {
    initialized: bool,
    queue: Option<Vec<PendingOperation<S, T, E>>>,
}

impl<S, T, E> InitGate<S, T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// A closed gate with an empty queue.
    pub fn new() -> Self {
        Self {
            initialized: false,
            queue: Some(Vec::new()),
        }
    }

    /// Queue `operation` if the gate is still closed, resetting its deferred
    /// to pending. Hands the operation back if the gate is open.
    pub fn guard(
        &mut self,
        operation: PendingOperation<S, T, E>,
    ) -> Option<PendingOperation<S, T, E>> {
        if self.initialized {
            return Some(operation);
        }

        operation.deferred.reset();
        let queue = self.queue.get_or_insert_with(Vec::new);
        queue.push(operation);
        debug!(
            operation = queue.last().map(PendingOperation::label),
            pending = queue.len(),
            "operation queued until initialization completes"
        );
        None
    }

    /// True once initialization has completed.
    pub fn is_open(&self) -> bool {
        self.initialized
    }

    /// Number of queued operations.
    pub fn pending_len(&self) -> usize {
        self.queue.as_ref().map_or(0, Vec::len)
    }

    /// Mark the gate open and take the queue, oldest first.
    ///
    /// Returns `None` if the gate was already open.
    pub fn open(&mut self) -> Option<Vec<PendingOperation<S, T, E>>> {
        if self.initialized {
            return None;
        }
        self.initialized = true;
        Some(self.queue.take().unwrap_or_default())
    }
}

impl<S, T, E> Default for InitGate<S, T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T, E> fmt::Debug for InitGate<S, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitGate")
            .field("initialized", &self.initialized)
            .field("pending", &self.queue.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use stowage_deferred::State;

    type Log = RefCell<Vec<&'static str>>;

    fn op(label: &'static str, deferred: Deferred<u32, String>) -> PendingOperation<Log, u32, String> {
        PendingOperation::new(label, deferred, move |log: &Log, d: Deferred<u32, String>| {
            log.borrow_mut().push(label);
            d.resolve_success(label.len() as u32);
        })
    }

    #[test]
    fn test_closed_gate_queues_and_resets() {
        let mut gate: InitGate<Log, u32, String> = InitGate::new();
        let d = Deferred::new();
        d.resolve_success(9);

        assert!(gate.guard(op("put", d.clone())).is_none());
        assert_eq!(d.state(), State::Pending);
        assert_eq!(gate.pending_len(), 1);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_open_gate_hands_operation_back() {
        let mut gate: InitGate<Log, u32, String> = InitGate::new();
        gate.open();

        let d = Deferred::new();
        let log = Log::default();
        let ready = gate.guard(op("get", d.clone())).expect("gate is open");
        ready.dispatch(&log);

        assert_eq!(*log.borrow(), vec!["get"]);
        assert_eq!(d.outcome(), Some(Ok(3)));
        assert_eq!(gate.pending_len(), 0);
    }

    #[test]
    fn test_open_drains_once_in_order() {
        let mut gate: InitGate<Log, u32, String> = InitGate::new();
        let first = Deferred::new();
        let second = Deferred::new();
        gate.guard(op("put", first.clone()));
        gate.guard(op("remove", second.clone()));

        let queue = gate.open().expect("first open");
        assert!(gate.open().is_none());
        assert!(gate.is_open());

        let log = Log::default();
        for pending in queue {
            pending.replay(&log);
        }

        assert_eq!(*log.borrow(), vec!["put", "remove"]);
        assert_eq!(first.outcome(), Some(Ok(3)));
        assert_eq!(second.outcome(), Some(Ok(6)));
    }

    #[test]
    fn test_replay_reaches_late_listeners() {
        let mut gate: InitGate<Log, u32, String> = InitGate::new();
        let d: Deferred<u32, String> = Deferred::new();
        gate.guard(PendingOperation::new("slow", d.clone(), |_: &Log, d: Deferred<u32, String>| {
            d.resolve_failure("disk".to_string());
        }));

        let seen = std::rc::Rc::new(RefCell::new(None));
        let s = std::rc::Rc::clone(&seen);
        d.on_failure(move |e| {
            *s.borrow_mut() = Some(e.clone());
            None
        });

        for pending in gate.open().unwrap_or_default() {
            pending.replay(&Log::default());
        }
        assert_eq!(seen.borrow().as_deref(), Some("disk"));
    }
}
