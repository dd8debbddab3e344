//! Registration-order and idempotence properties of settlement.

use promise_bridge::{Continuation, Error, Outcome, Promise};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn arb_outcome() -> impl Strategy<Value = Outcome<i64>> {
    prop_oneof![
        any::<i64>().prop_map(Ok),
        "[a-z]{1,8}".prop_map(|message| Err(Error::upstream(message))),
    ]
}

fn describe(outcome: &Outcome<i64>) -> String {
    match outcome {
        Ok(value) => format!("ok:{value}"),
        Err(err) => format!("err:{err}"),
    }
}

proptest! {
    /// Each continuation fires exactly once with the first outcome, wherever
    /// it was registered relative to settlement.
    #[test]
    fn observers_fire_once_with_first_outcome(
        before in 0usize..8,
        after in 0usize..8,
        outcomes in prop::collection::vec(arb_outcome(), 1..4),
    ) {
        let (promise, resolver) = Promise::<i64>::pending();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let register = |id: usize| {
            let seen = seen.clone();
            promise.observe(Continuation::from_fn(move |outcome| {
                seen.lock().unwrap().push((id, describe(&outcome)));
            }));
        };

        (0..before).for_each(register);
        let expected = describe(&outcomes[0]);
        for outcome in outcomes {
            resolver.resolve(outcome);
        }
        (before..before + after).for_each(register);

        let seen = seen.lock().unwrap();
        prop_assert_eq!(seen.len(), before + after);
        for (position, (id, outcome)) in seen.iter().enumerate() {
            prop_assert_eq!(*id, position);
            prop_assert_eq!(outcome, &expected);
        }
    }

    /// Settling twice looks the same as settling once with the first outcome.
    #[test]
    fn second_settlement_is_invisible(first in arb_outcome(), second in arb_outcome()) {
        let (once, once_resolver) = Promise::<i64>::pending();
        let (twice, twice_resolver) = Promise::<i64>::pending();
        once_resolver.resolve(first.clone());
        twice_resolver.resolve(first);
        prop_assert!(!twice_resolver.resolve(second));
        let once = once.outcome().map(|outcome| describe(&outcome));
        let twice = twice.outcome().map(|outcome| describe(&outcome));
        prop_assert_eq!(once, twice);
    }
}
