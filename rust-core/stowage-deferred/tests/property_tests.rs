// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for deferred dispatch and groups

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use stowage_deferred::{Deferred, State};

/// One contribution made to a group: a success or a failure.
fn arb_contributions() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..24)
}

proptest! {
    #[test]
    fn test_group_fires_once_after_target_successes(
        target in 1usize..8,
        contributions in arb_contributions()
    ) {
        let group: Deferred<usize, String> = Deferred::group(target);
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        group.on_success(move |_| {
            f.set(f.get() + 1);
            None
        });

        let mut successes = 0;
        let mut failed_first = false;
        for (i, ok) in contributions.iter().enumerate() {
            if *ok {
                if !failed_first {
                    successes += 1;
                }
                group.resolve_success(i);
            } else {
                if successes < target {
                    failed_first = true;
                }
                group.resolve_failure(format!("contribution {i}"));
            }
        }

        let expected_fire = if successes >= target && !failed_first { 1 } else { 0 };
        prop_assert_eq!(fired.get(), expected_fire);
        if failed_first {
            prop_assert_eq!(group.state(), State::Failed);
        }
    }

    #[test]
    fn test_listeners_fire_exactly_once_in_order(
        before in 0usize..10,
        after in 0usize..10
    ) {
        let d: Deferred<u8, ()> = Deferred::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..before {
            let log = Rc::clone(&log);
            d.on_success(move |_| {
                log.borrow_mut().push(i);
                None
            });
        }
        d.resolve_success(1);
        for i in before..before + after {
            let log = Rc::clone(&log);
            d.on_success(move |_| {
                log.borrow_mut().push(i);
                None
            });
        }
        d.resolve_success(2);

        let expected: Vec<usize> = (0..before + after).collect();
        prop_assert_eq!(log.borrow().clone(), expected);
    }
}

#[tokio::test]
async fn test_await_deferred_resolved_later() {
    let d: Deferred<String, String> = Deferred::new();
    let waiting = d.clone().into_future();

    let resolver = d.clone();
    resolver.resolve_success("ready".to_string());

    assert_eq!(waiting.await, Ok("ready".to_string()));
}

#[tokio::test]
async fn test_await_already_failed_deferred() {
    let d: Deferred<u32, String> = Deferred::failed("io".to_string());
    assert_eq!(d.into_future().await, Err("io".to_string()));
}
