use crate::cell::{Continuation, Outcome, SettlementCell};
use crate::error::catch_panic;
use crate::{Error, Resolver};
use parking_lot::Mutex;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Handle to a value that settles exactly once, to a value or an [`Error`].
///
/// Continuations may be attached before or after settlement, any number of
/// times; each runs once. Chaining methods return a new promise with its own
/// cell, fed by observing this one. Cloning a `Promise` clones the handle, not
/// the operation behind it.
///
/// Nothing blocks on a promise. Consume it with continuations or `.await`.
/// A rejection that nobody observes is dropped silently.
///
/// # Examples
///
/// ```
/// use promise_bridge::Promise;
///
/// let (promise, resolver) = Promise::<u32>::pending();
/// let doubled = promise
///     .then(|n| Promise::fulfilled(n * 2))
///     .map(|n| n + 1);
/// resolver.fulfill(20);
/// assert_eq!(doubled.value(), Some(41));
/// ```
pub struct Promise<T> {
    pub(crate) cell: Arc<SettlementCell<T>>,
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// A pending promise and the resolver that settles it.
    pub fn pending() -> (Self, Resolver<T>) {
        let promise = Self::unsettled();
        let resolver = Resolver::new(promise.cell.clone());
        (promise, resolver)
    }

    pub fn fulfilled(value: T) -> Self {
        Self::from_outcome(Ok(value))
    }

    pub fn rejected(err: Error) -> Self {
        Self::from_outcome(Err(err))
    }

    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        Promise {
            cell: Arc::new(SettlementCell::settled(outcome)),
        }
    }

    /// A pending promise settled only through its cell.
    pub(crate) fn unsettled() -> Self {
        Promise {
            cell: Arc::new(SettlementCell::new()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.cell.outcome().is_none()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.cell.outcome(), Some(Ok(_)))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.cell.outcome(), Some(Err(_)))
    }

    /// The fulfilled value, if there is one yet.
    pub fn value(&self) -> Option<T> {
        self.cell.outcome().and_then(Result::ok)
    }

    pub fn error(&self) -> Option<Error> {
        self.cell.outcome().and_then(Result::err)
    }

    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.cell.outcome()
    }

    pub fn observe(&self, continuation: Continuation<T>) {
        self.cell.observe(continuation);
    }

    /// Chain a step that produces another promise.
    ///
    /// The returned promise settles when the promise produced by `on_fulfilled`
    /// settles, however deep that chain goes. A rejection skips `on_fulfilled`
    /// and passes through unchanged.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => Promise::rejected(err),
        })
    }

    /// Two-armed [`then`](Promise::then): exactly one of the handlers runs.
    pub fn then_or_else<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
        R: FnOnce(Error) -> Promise<U> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => on_rejected(err),
        })
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(move |outcome| Promise::from_outcome(outcome.map(f)))
    }

    /// Like [`map`](Promise::map), but `f` may fail and reject the result.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        self.chain(move |outcome| Promise::from_outcome(outcome.and_then(f)))
    }

    /// Recover from a rejection. `handler` may return a fulfilled promise to
    /// recover, or a rejected one to replace the error.
    pub fn catch_error<F>(&self, handler: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Promise<T> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => Promise::fulfilled(value),
            Err(err) => handler(err),
        })
    }

    /// Run `action` whatever the outcome, then forward the outcome unchanged.
    /// If `action` fails its error replaces the outcome.
    pub fn always<F>(&self, action: F) -> Promise<T>
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        self.chain(move |outcome| match action() {
            Ok(()) => Promise::from_outcome(outcome),
            Err(err) => Promise::rejected(err),
        })
    }

    /// Reject this promise with [`Error::Cancelled`] if it is still pending.
    ///
    /// Cancellation is local: continuations see the rejection, but the
    /// operation feeding the promise is not told and runs to completion. Its
    /// eventual result is discarded.
    pub fn cancel(&self) -> bool {
        let cancelled = self.cell.settle(Err(Error::Cancelled));
        if cancelled {
            tracing::debug!("promise cancelled locally");
        }
        cancelled
    }

    fn chain<U, F>(&self, step: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> Promise<U> + Send + 'static,
    {
        let derived = Promise::<U>::unsettled();
        let target = derived.cell.clone();
        self.cell.observe(Continuation::from_fn(move |outcome| {
            let next = catch_panic(|| step(outcome))
                .unwrap_or_else(|message| Promise::rejected(Error::Panicked(message)));
            next.cell.observe(Continuation::from_fn(move |outcome| {
                target.settle(outcome);
            }));
        }));
        derived
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            cell: self.cell.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.cell.label())
            .finish()
    }
}

/// Future returned by awaiting a [`Promise`].
#[derive(Debug)]
pub struct Wait<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

#[derive(Debug)]
struct Slot<T> {
    outcome: Option<Outcome<T>>,
    waker: Option<Waker>,
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Outcome<T>;
    type IntoFuture = Wait<T>;

    fn into_future(self) -> Wait<T> {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            waker: None,
        }));
        let sink = slot.clone();
        self.cell.observe(Continuation::from_fn(move |outcome| {
            let waker = {
                let mut slot = sink.lock();
                slot.outcome = Some(outcome);
                slot.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake()
            }
        }));
        Wait { slot }
    }
}

impl<T> Future for Wait<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
