//! Aggregation over several promises.
//!
//! None of these cancel their inputs. Once the aggregate settles, the inputs
//! keep running and their later outcomes are ignored.

use crate::adapter::{adapt, Nullary};
use crate::cell::{Continuation, Outcome};
use crate::Promise;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Gather<T> {
    fn new(len: usize) -> Self {
        Gather {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Store `value`, returning every value once the last slot fills.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.slots[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            Some(self.slots.iter_mut().filter_map(Option::take).collect())
        } else {
            None
        }
    }
}

/// Fulfill with every value, in input order, once all inputs fulfill.
///
/// Rejects with the first error observed without waiting for the rest. An
/// empty input fulfills immediately with an empty `Vec`.
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::fulfilled(Vec::new());
    }
    let joined = Promise::<Vec<T>>::unsettled();
    let gather = Arc::new(Mutex::new(Gather::new(promises.len())));
    for (index, promise) in promises.iter().enumerate() {
        let gather = gather.clone();
        let on_value = joined.cell.clone();
        let on_error = joined.cell.clone();
        promise.observe(Continuation::new(
            move |value| {
                let done = gather.lock().fill(index, value);
                if let Some(values) = done {
                    on_value.settle(Ok(values));
                }
            },
            move |err| {
                on_error.settle(Err(err));
            },
        ));
    }
    joined
}

/// Fulfill with every outcome, in input order, once all inputs settle.
/// Never rejects.
pub fn all_settled<T, I>(promises: I) -> Promise<Vec<Outcome<T>>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    all(promises.into_iter().map(|promise| {
        promise.then_or_else(
            |value| Promise::fulfilled(Ok(value)),
            |err| Promise::fulfilled(Err(err)),
        )
    }))
}

/// Settle with whichever input settles first.
///
/// An empty input never settles.
pub fn race<T, I>(promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let winner = Promise::<T>::unsettled();
    for promise in promises {
        let target = winner.cell.clone();
        promise.observe(Continuation::from_fn(move |outcome| {
            target.settle(outcome);
        }));
    }
    winner
}

/// [`all`] for two promises of different types.
pub fn join2<A, B>(a: &Promise<A>, b: &Promise<B>) -> Promise<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    let joined = Promise::<(A, B)>::unsettled();
    let slots: Arc<Mutex<(Option<A>, Option<B>)>> = Arc::new(Mutex::new((None, None)));

    let (left, target) = (slots.clone(), joined.cell.clone());
    let on_error = joined.cell.clone();
    a.observe(Continuation::new(
        move |value| {
            left.lock().0 = Some(value);
            if let Some(pair) = take_pair(&*left) {
                target.settle(Ok(pair));
            }
        },
        move |err| {
            on_error.settle(Err(err));
        },
    ));

    let (right, target) = (slots, joined.cell.clone());
    let on_error = joined.cell.clone();
    b.observe(Continuation::new(
        move |value| {
            right.lock().1 = Some(value);
            if let Some(pair) = take_pair(&*right) {
                target.settle(Ok(pair));
            }
        },
        move |err| {
            on_error.settle(Err(err));
        },
    ));
    joined
}

fn take_pair<A, B>(slots: &Mutex<(Option<A>, Option<B>)>) -> Option<(A, B)> {
    let mut slots = slots.lock();
    match (slots.0.take(), slots.1.take()) {
        (Some(a), Some(b)) => Some((a, b)),
        (a, b) => {
            *slots = (a, b);
            None
        }
    }
}

/// [`all`] for three promises of different types.
pub fn join3<A, B, C>(a: &Promise<A>, b: &Promise<B>, c: &Promise<C>) -> Promise<(A, B, C)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    join2(&join2(a, b), c).map(|((a, b), c)| (a, b, c))
}

/// Fulfill after `delay`, timed on a helper thread.
pub fn after(delay: Duration) -> Promise<()> {
    adapt::<Nullary, _>(move |completion| {
        thread::spawn(move || {
            thread::sleep(delay);
            completion.complete(());
        });
    })
}
