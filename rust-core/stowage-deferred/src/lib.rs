// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stowage Deferred Operation Engine
//
// This crate provides the single-threaded deferred result that every Stowage
// store operation hands back to its caller. A deferred resolves exactly once,
// through either its success or its failure channel, and dispatches its
// listeners synchronously inside the resolving call.
//
// # Features
//
// - Listener chaining: a listener may return another deferred, which extends
//   the chain through the forward deferred returned by `then`.
// - Groups: a deferred that succeeds only after N contributions.
// - A shared error bus per chain.
// - An async bridge (`into_future`) for callers that prefer `.await`.
//
// # Example
//
// ```rust
// use stowage_deferred::Deferred;
//
// let saves: Deferred<&'static str, String> = Deferred::group(2);
// saves.resolve_success("first");
// assert!(saves.is_pending());
// saves.resolve_success("second");
// assert_eq!(saves.outcome(), Some(Ok("second")));
// ```

pub mod deferred;

pub use deferred::{Deferred, DeferredFuture, State};
