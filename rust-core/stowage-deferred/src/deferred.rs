// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deferred results for Stowage.
//
// A `Deferred` is a cheaply cloneable handle to a single eventual outcome.
// Listeners are queued per channel and dispatched synchronously, in
// registration order, inside the call that resolves the deferred. A listener
// may hand back another deferred; the first one handed back extends the chain
// through the forward deferred returned by `then`.
//
// Everything here is single-threaded (`Rc` + `RefCell`). No borrow is held
// while user code runs, so listeners may freely re-enter the deferred they
// were registered on.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use tracing::trace;

/// Lifecycle of a [`Deferred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not resolved yet.
    Pending,
    /// Resolved through the success channel.
    Succeeded,
    /// Resolved through the failure channel.
    Failed,
    /// Resolved, and the forward deferred has been bound to a returned one.
    Chained,
}

type Listener<A, T, E> = Box<dyn FnOnce(&A) -> Option<Deferred<T, E>>>;
type ErrorHandler<E> = Box<dyn FnMut(&E)>;

/// Failure handlers shared by every link of one chain.
type ErrorBus<E> = Rc<RefCell<Vec<ErrorHandler<E>>>>;

#[derive(Debug, Clone, Copy)]
struct GroupCounter {
    target: usize,
    count: usize,
}

struct Inner<T, E> {
    outcome: Option<Rc<Result<T, E>>>,
    chained: bool,
    successes: VecDeque<Listener<T, T, E>>,
    failures: VecDeque<Listener<E, T, E>>,
    forward: Option<Deferred<T, E>>,
    returned: Option<Deferred<T, E>>,
    chain_failure: bool,
    bus: ErrorBus<E>,
    bus_notified: bool,
    group: Option<GroupCounter>,
}

impl<T, E> Inner<T, E> {
    fn new(bus: ErrorBus<E>, group: Option<GroupCounter>) -> Self {
        Self {
            outcome: None,
            chained: false,
            successes: VecDeque::new(),
            failures: VecDeque::new(),
            forward: None,
            returned: None,
            chain_failure: false,
            bus,
            bus_notified: false,
            group,
        }
    }
}

/// A single-threaded deferred result with chaining and grouping.
///
/// `T` is the success payload and `E` the failure payload. Cloning a
/// `Deferred` clones the handle, not the outcome: every clone observes and
/// drives the same state.
///
/// # Example
///
/// ```rust
/// use stowage_deferred::{Deferred, State};
///
/// let first: Deferred<u32, String> = Deferred::new();
/// let second: Deferred<u32, String> = Deferred::new();
///
/// let inner = second.clone();
/// let forward = first.then(move |n| {
///     assert_eq!(*n, 1);
///     Some(inner.clone())
/// }, |_| None);
///
/// first.resolve_success(1);
/// assert_eq!(forward.state(), State::Pending);
///
/// second.resolve_success(2);
/// assert_eq!(forward.outcome(), Some(Ok(2)));
/// assert_eq!(first.state(), State::Chained);
/// ```
pub struct Deferred<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Deferred")
            .field("resolved", &inner.outcome.is_some())
            .field("chained", &inner.chained)
            .field("successes", &inner.successes.len())
            .field("failures", &inner.failures.len())
            .field("group", &inner.group.map(|g| (g.count, g.target)))
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Deferred<T, E> {
    /// Create a pending deferred that is the root of its own chain.
    pub fn new() -> Self {
        Self::build(Rc::new(RefCell::new(Vec::new())), None)
    }

    /// Create a group deferred: success only fires once `target` successful
    /// contributions have been made while still pending. Any failure fires
    /// immediately and suppresses all later contributions.
    ///
    /// A target of zero fires on the first contribution.
    pub fn group(target: usize) -> Self {
        Self::build(
            Rc::new(RefCell::new(Vec::new())),
            Some(GroupCounter { target, count: 0 }),
        )
    }

    /// A deferred that has already succeeded with `payload`.
    pub fn done(payload: T) -> Self {
        let deferred = Self::new();
        deferred.resolve_success(payload);
        deferred
    }

    /// A deferred that has already failed with `error`.
    pub fn failed(error: E) -> Self {
        let deferred = Self::new();
        deferred.resolve_failure(error);
        deferred
    }

    /// A fresh pending root deferred with the same group target as this one.
    pub fn renewed(&self) -> Self {
        let group = self.inner.borrow().group;
        Self::build(
            Rc::new(RefCell::new(Vec::new())),
            group.map(|g| GroupCounter {
                target: g.target,
                count: 0,
            }),
        )
    }

    fn build(bus: ErrorBus<E>, group: Option<GroupCounter>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new(bus, group))),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        let inner = self.inner.borrow();
        if inner.chained {
            return State::Chained;
        }
        match inner.outcome.as_deref() {
            None => State::Pending,
            Some(Ok(_)) => State::Succeeded,
            Some(Err(_)) => State::Failed,
        }
    }

    /// True until either channel resolves.
    pub fn is_pending(&self) -> bool {
        self.inner.borrow().outcome.is_none()
    }

    /// A copy of the stored outcome, if resolved.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.inner
            .borrow()
            .outcome
            .as_deref()
            .map(|outcome| outcome.clone())
    }

    /// True if both handles drive the same deferred.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a success and a failure listener and return the forward
    /// deferred.
    ///
    /// The forward deferred is allocated once per deferred and completes
    /// with the outcome of the first deferred handed back by a success
    /// listener (or by a failure listener, after [`Deferred::either`]). If
    /// no listener hands one back the forward deferred stays pending.
    ///
    /// Listeners registered after resolution fire immediately; earlier
    /// listeners are never replayed.
    pub fn then<S, F>(&self, on_success: S, on_failure: F) -> Self
    where
        S: FnOnce(&T) -> Option<Self> + 'static,
        F: FnOnce(&E) -> Option<Self> + 'static,
    {
        self.register(Some(Box::new(on_success)), Some(Box::new(on_failure)), true)
    }

    /// Register only a success listener. See [`Deferred::then`].
    pub fn on_success<S>(&self, on_success: S) -> Self
    where
        S: FnOnce(&T) -> Option<Self> + 'static,
    {
        self.register(Some(Box::new(on_success)), None, true)
    }

    /// Register only a failure listener. See [`Deferred::then`].
    pub fn on_failure<F>(&self, on_failure: F) -> Self
    where
        F: FnOnce(&E) -> Option<Self> + 'static,
    {
        self.register(None, Some(Box::new(on_failure)), true)
    }

    /// Register one listener for both channels.
    ///
    /// Also lets a deferred handed back from the failure channel continue
    /// the chain.
    pub fn either<C>(&self, on_complete: C) -> Self
    where
        C: FnOnce(Result<&T, &E>) -> Option<Self> + 'static,
    {
        self.inner.borrow_mut().chain_failure = true;

        let slot = Rc::new(RefCell::new(Some(on_complete)));
        let failure_slot = Rc::clone(&slot);

        self.then(
            move |payload| {
                let complete = slot.borrow_mut().take();
                complete.and_then(|complete| complete(Ok(payload)))
            },
            move |error| {
                let complete = failure_slot.borrow_mut().take();
                complete.and_then(|complete| complete(Err(error)))
            },
        )
    }

    /// Attach a handler to the chain's error bus.
    ///
    /// The handler fires for every link of the chain that fails, including
    /// this one if it has already failed.
    pub fn on_error<H>(&self, handler: H) -> Self
    where
        H: FnMut(&E) + 'static,
    {
        let mut handler: ErrorHandler<E> = Box::new(handler);

        let failed = {
            let inner = self.inner.borrow();
            match inner.outcome.as_deref() {
                Some(Err(_)) => inner.outcome.clone(),
                _ => None,
            }
        };

        if let Some(outcome) = failed {
            if let Err(error) = outcome.as_ref() {
                handler(error);
            }
        }

        let bus = Rc::clone(&self.inner.borrow().bus);
        bus.borrow_mut().push(handler);
        self.clone()
    }

    /// Resolve through the success channel. No-op unless pending.
    pub fn resolve_success(&self, payload: T) {
        self.resolve_success_with(move || payload);
    }

    /// Resolve through the success channel, building the payload only if
    /// this call actually resolves the deferred.
    ///
    /// For a group deferred this counts as one contribution.
    pub fn resolve_success_with<P>(&self, payload: P)
    where
        P: FnOnce() -> T,
    {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            if let Some(group) = inner.group.as_mut() {
                group.count += 1;
                if group.count < group.target {
                    return;
                }
            }
        }

        // Built outside the borrow; the closure may inspect other deferreds.
        let payload = payload();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(Rc::new(Ok(payload)));
        }
        self.run_successes();
    }

    /// Resolve through the failure channel. No-op unless pending.
    pub fn resolve_failure(&self, error: E) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(Rc::new(Err(error)));
        }
        self.run_failures();
    }

    /// Return to pending, dropping every queued listener, the chain's error
    /// handlers, and the forward deferred.
    ///
    /// Only meaningful before any work has started for this deferred.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.outcome = None;
        inner.chained = false;
        inner.chain_failure = false;
        inner.successes.clear();
        inner.failures.clear();
        inner.forward = None;
        inner.returned = None;
        inner.bus_notified = false;
        inner.bus.borrow_mut().clear();
        if let Some(group) = inner.group.as_mut() {
            group.count = 0;
        }
    }

    /// Complete this deferred with whatever `source` completes with.
    pub fn bind_to(&self, source: &Self) {
        let on_success = self.clone();
        let on_failure = self.clone();
        source.register(
            Some(Box::new(move |payload: &T| -> Option<Self> {
                on_success.resolve_success(payload.clone());
                None
            })),
            Some(Box::new(move |error: &E| -> Option<Self> {
                on_failure.resolve_failure(error.clone());
                None
            })),
            false,
        );
    }

    /// Like [`Deferred::bind_to`], replacing the success payload with
    /// `replace(payload)`.
    pub fn bind_to_with<R>(&self, source: &Self, replace: R)
    where
        R: FnOnce(&T) -> T + 'static,
    {
        let on_success = self.clone();
        let on_failure = self.clone();
        source.register(
            Some(Box::new(move |payload: &T| -> Option<Self> {
                on_success.resolve_success(replace(payload));
                None
            })),
            Some(Box::new(move |error: &E| -> Option<Self> {
                on_failure.resolve_failure(error.clone());
                None
            })),
            false,
        );
    }

    /// Bridge into a `std::future::Future`.
    ///
    /// The returned future completes when this deferred resolves. If the
    /// deferred is dropped unresolved, the future stays pending, exactly like
    /// the deferred it came from.
    pub fn into_future(self) -> DeferredFuture<T, E> {
        let (sender, receiver) = oneshot::channel();
        let sender = Rc::new(RefCell::new(Some(sender)));
        let failure_sender = Rc::clone(&sender);

        self.register(
            Some(Box::new(move |payload: &T| -> Option<Self> {
                if let Some(sender) = sender.borrow_mut().take() {
                    let _ = sender.send(Ok(payload.clone()));
                }
                None
            })),
            Some(Box::new(move |error: &E| -> Option<Self> {
                if let Some(sender) = failure_sender.borrow_mut().take() {
                    let _ = sender.send(Err(error.clone()));
                }
                None
            })),
            false,
        );

        DeferredFuture { receiver }
    }

    fn register(
        &self,
        on_success: Option<Listener<T, T, E>>,
        on_failure: Option<Listener<E, T, E>>,
        with_forward: bool,
    ) -> Self {
        let forward = {
            let mut inner = self.inner.borrow_mut();
            if let Some(listener) = on_success {
                inner.successes.push_back(listener);
            }
            if let Some(listener) = on_failure {
                inner.failures.push_back(listener);
            }

            if !with_forward {
                None
            } else if let Some(forward) = &inner.forward {
                Some(forward.clone())
            } else {
                let forward = Self::build(Rc::clone(&inner.bus), None);
                inner.forward = Some(forward.clone());
                Some(forward)
            }
        };

        self.dispatch();
        forward.unwrap_or_else(|| self.clone())
    }

    fn dispatch(&self) {
        let succeeded = match self.inner.borrow().outcome.as_deref() {
            None => return,
            Some(outcome) => outcome.is_ok(),
        };
        if succeeded {
            self.run_successes();
        } else {
            self.run_failures();
        }
    }

    fn run_successes(&self) {
        loop {
            let (listener, outcome) = {
                let mut inner = self.inner.borrow_mut();
                let Some(listener) = inner.successes.pop_front() else {
                    break;
                };
                let Some(outcome) = inner.outcome.clone() else {
                    return;
                };
                (listener, outcome)
            };

            if let Ok(payload) = outcome.as_ref() {
                let returned = listener(payload);
                self.capture(returned);
            }
        }

        self.link_forward();
    }

    fn run_failures(&self) {
        let mut outcome = None;
        loop {
            let listener = {
                let mut inner = self.inner.borrow_mut();
                if outcome.is_none() {
                    outcome = inner.outcome.clone();
                }
                inner.failures.pop_front()
            };
            let Some(listener) = listener else { break };

            if let Some(Err(error)) = outcome.as_deref() {
                let returned = listener(error);
                if self.inner.borrow().chain_failure {
                    self.capture(returned);
                }
            }
        }

        if let Some(outcome) = outcome {
            if let Err(error) = outcome.as_ref() {
                self.notify_bus(error);
            }
        }

        self.link_forward();
    }

    fn notify_bus(&self, error: &E) {
        let bus = {
            let mut inner = self.inner.borrow_mut();
            if inner.bus_notified {
                return;
            }
            inner.bus_notified = true;
            Rc::clone(&inner.bus)
        };

        // Handlers attached while we run land in the fresh vector and are
        // merged back afterwards.
        let mut handlers = std::mem::take(&mut *bus.borrow_mut());
        for handler in handlers.iter_mut() {
            handler(error);
        }
        let mut current = bus.borrow_mut();
        handlers.append(&mut current);
        *current = handlers;
    }

    fn capture(&self, returned: Option<Self>) {
        if let Some(returned) = returned {
            let mut inner = self.inner.borrow_mut();
            if inner.returned.is_none() {
                inner.returned = Some(returned);
            }
        }
    }

    fn link_forward(&self) {
        let link = {
            let mut inner = self.inner.borrow_mut();
            if inner.chained {
                return;
            }
            let eligible = match inner.outcome.as_deref() {
                Some(Ok(_)) => true,
                Some(Err(_)) => inner.chain_failure,
                None => false,
            };
            match (eligible, &inner.forward, &inner.returned) {
                (true, Some(forward), Some(returned)) => {
                    let link = (forward.clone(), returned.clone());
                    inner.chained = true;
                    Some(link)
                }
                _ => None,
            }
        };

        if let Some((forward, returned)) = link {
            trace!("binding forward deferred to returned deferred");
            forward.bind_to(&returned);
        }
    }
}

/// A `Future` view of a [`Deferred`], created by [`Deferred::into_future`].
#[derive(Debug)]
pub struct DeferredFuture<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for DeferredFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender dropped unresolved: the deferred can never complete.
            Poll::Ready(Err(oneshot::Canceled)) | Poll::Pending => Poll::Pending,
        }
    }
}
