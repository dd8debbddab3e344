//! The once-settleable cell behind every [`Promise`](crate::Promise).
//!
//! A cell starts pending and queues continuations. The first call to
//! [`SettlementCell::settle`] stores the outcome and drains the queue; any
//! later call is ignored. Continuations always run outside the lock: queued
//! ones on the settling thread, late ones on the observing thread.
//!
//! Dispatch goes through a per-thread run queue. A continuation that settles
//! or observes another cell while running does not recurse into that cell's
//! continuations; they are queued and run once it returns. Chains of any
//! depth therefore settle in constant stack.

use crate::Error;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type Job = Box<dyn FnOnce()>;

thread_local! {
    /// `Some` while this thread is draining.
    static RUN_QUEUE: RefCell<Option<VecDeque<Job>>> = RefCell::new(None);
}

/// Run `jobs` in order, after anything already queued on this thread.
fn dispatch(jobs: impl IntoIterator<Item = Job>) {
    let mut jobs = jobs.into_iter();
    let draining = RUN_QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        match queue.as_mut() {
            Some(pending) => {
                pending.extend(&mut jobs);
                true
            }
            None => {
                *queue = Some(jobs.by_ref().collect());
                false
            }
        }
    });
    if draining {
        return;
    }

    let mut first_panic = None;
    while let Some(job) = next_job() {
        // A panicking continuation must not strand the ones queued behind it.
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            first_panic.get_or_insert(payload);
        }
    }
    RUN_QUEUE.with(|queue| *queue.borrow_mut() = None);
    if let Some(payload) = first_panic {
        panic::resume_unwind(payload);
    }
}

fn next_job() -> Option<Job> {
    RUN_QUEUE.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front))
}

/// Terminal value of a promise.
pub type Outcome<T> = Result<T, Error>;

/// One registered chain step.
///
/// A continuation is consumed when it runs, so exactly one of its arms fires
/// and it fires once.
pub struct Continuation<T> {
    run: Box<dyn FnOnce(Outcome<T>) + Send>,
}

impl<T: Send + 'static> Continuation<T> {
    pub fn new<F, R>(on_fulfilled: F, on_rejected: R) -> Self
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(Error) + Send + 'static,
    {
        Self::from_fn(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => on_rejected(err),
        })
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        Continuation { run: Box::new(f) }
    }

    fn into_job(self, outcome: Outcome<T>) -> Job {
        Box::new(move || (self.run)(outcome))
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation")
    }
}

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Outcome<T>),
}

pub(crate) struct SettlementCell<T> {
    state: Mutex<State<T>>,
}

impl<T> SettlementCell<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new() -> Self {
        SettlementCell {
            state: Mutex::new(State::Pending(Vec::new())),
        }
    }

    pub(crate) fn settled(outcome: Outcome<T>) -> Self {
        SettlementCell {
            state: Mutex::new(State::Settled(outcome)),
        }
    }

    /// Settle the cell, returning `false` if it had already settled.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
        let observers = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Settled(_) => return false,
                State::Pending(observers) => {
                    let observers = std::mem::take(observers);
                    *state = State::Settled(outcome.clone());
                    observers
                }
            }
        };
        tracing::trace!(
            observers = observers.len(),
            fulfilled = outcome.is_ok(),
            "promise settled"
        );
        dispatch(
            observers
                .into_iter()
                .map(|observer| observer.into_job(outcome.clone())),
        );
        true
    }

    pub(crate) fn observe(&self, continuation: Continuation<T>) {
        let outcome = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending(observers) => {
                    observers.push(continuation);
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        dispatch(Some(continuation.into_job(outcome)));
    }

    pub(crate) fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }
}

impl<T> SettlementCell<T> {
    pub(crate) fn label(&self) -> &'static str {
        match &*self.state.lock() {
            State::Pending(_) => "pending",
            State::Settled(Ok(_)) => "fulfilled",
            State::Settled(Err(_)) => "rejected",
        }
    }
}

impl<T> fmt::Debug for SettlementCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementCell")
            .field("state", &self.label())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tracing_test::traced_test;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Continuation<i32> {
        let log = log.clone();
        Continuation::new(
            {
                let log = log.clone();
                move |v| log.lock().push(format!("{tag}:ok:{v}"))
            },
            move |e| log.lock().push(format!("{tag}:err:{e}")),
        )
    }

    #[test]
    fn queued_observers_run_in_registration_order() {
        let cell = SettlementCell::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        cell.observe(recorder(&log, "a"));
        cell.observe(recorder(&log, "b"));
        assert!(log.lock().is_empty());

        assert!(cell.settle(Ok(5)));
        assert_eq!(*log.lock(), vec!["a:ok:5", "b:ok:5"]);
    }

    #[test]
    fn late_observer_runs_immediately() {
        let cell = SettlementCell::new();
        cell.settle(Err(Error::upstream("late")));
        let log = Arc::new(Mutex::new(Vec::new()));
        cell.observe(recorder(&log, "c"));
        assert_eq!(*log.lock(), vec!["c:err:late"]);
    }

    #[test]
    fn second_settle_is_ignored() {
        let cell = SettlementCell::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        cell.observe(recorder(&log, "a"));
        assert!(cell.settle(Ok(1)));
        assert!(!cell.settle(Ok(2)));
        assert!(!cell.settle(Err(Error::Cancelled)));
        assert_eq!(*log.lock(), vec!["a:ok:1"]);
        assert_eq!(cell.outcome().unwrap().unwrap(), 1);
    }

    #[test]
    fn observer_may_reenter_cell() {
        let cell = Arc::new(SettlementCell::new());
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let inner_cell = cell.clone();
            let hits = hits.clone();
            cell.observe(Continuation::from_fn(move |_| {
                let hits = hits.clone();
                inner_cell.observe(Continuation::from_fn(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }));
                inner_cell.settle(Ok(99));
            }));
        }
        cell.settle(Ok(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_settlement_runs_after_current_continuation() {
        let first = SettlementCell::new();
        let second = Arc::new(SettlementCell::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        second.observe(recorder(&log, "second"));
        {
            let second = second.clone();
            let log = log.clone();
            first.observe(Continuation::from_fn(move |_| {
                second.settle(Ok(2));
                log.lock().push("first".to_string());
            }));
        }
        first.settle(Ok(1));
        assert_eq!(*log.lock(), vec!["first", "second:ok:2"]);
    }

    #[test]
    fn panicking_continuation_does_not_strand_the_rest() {
        let cell = SettlementCell::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        cell.observe(Continuation::from_fn(|_| panic!("observer failed")));
        cell.observe(recorder(&log, "after"));

        let settled = panic::catch_unwind(AssertUnwindSafe(|| cell.settle(Ok(4))));
        assert!(settled.is_err());
        assert_eq!(*log.lock(), vec!["after:ok:4"]);

        cell.observe(recorder(&log, "late"));
        assert_eq!(*log.lock(), vec!["after:ok:4", "late:ok:4"]);
    }

    #[test]
    fn concurrent_settlers_have_one_winner() {
        let cell = Arc::new(SettlementCell::new());
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            cell.observe(Continuation::from_fn(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cell = cell.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cell.settle(Ok(i))
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_reports_state() {
        let cell: SettlementCell<i32> = SettlementCell::new();
        assert_eq!(format!("{cell:?}"), "SettlementCell { state: \"pending\" }");
        cell.settle(Err(Error::Denied));
        assert_eq!(cell.label(), "rejected");
    }

    #[traced_test]
    #[test]
    fn settlement_is_traced() {
        let cell = SettlementCell::new();
        cell.settle(Ok(3));
        assert!(logs_contain("promise settled"));
    }
}
