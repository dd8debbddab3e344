use crate::cell::{Outcome, SettlementCell};
use crate::Error;
use std::fmt;
use std::sync::Arc;

/// The settling side of a [`Promise`](crate::Promise).
///
/// A `Resolver` may be cloned and handed to callbacks that fire more than
/// once. Only the first settlement takes effect; the rest report `false`.
///
/// If every clone is dropped while the promise is still pending, the promise
/// is rejected with [`Error::Abandoned`].
///
/// # Examples
///
/// ```
/// use promise_bridge::Promise;
/// use std::thread;
///
/// let (promise, resolver) = Promise::<String>::pending();
/// let task = thread::spawn(move || {
///     resolver.fulfill("🍓".into());
/// });
/// task.join().expect("The task thread has panicked");
/// assert_eq!(promise.value().as_deref(), Some("🍓"));
/// ```
pub struct Resolver<T>
where
    T: Clone + Send + 'static,
{
    inner: Arc<Guard<T>>,
}

struct Guard<T>
where
    T: Clone + Send + 'static,
{
    cell: Arc<SettlementCell<T>>,
}

impl<T> Resolver<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(cell: Arc<SettlementCell<T>>) -> Self {
        Resolver {
            inner: Arc::new(Guard { cell }),
        }
    }

    pub fn fulfill(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    pub fn reject(&self, err: Error) -> bool {
        self.resolve(Err(err))
    }

    /// Settle with `outcome`. Returns `false` if the promise had already
    /// settled, in which case `outcome` is discarded.
    pub fn resolve(&self, outcome: Outcome<T>) -> bool {
        let settled = self.inner.cell.settle(outcome);
        if !settled {
            tracing::debug!("ignoring settlement of an already settled promise");
        }
        settled
    }

    pub fn is_pending(&self) -> bool {
        self.inner.cell.outcome().is_none()
    }
}

impl<T> Clone for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Resolver {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Guard<T>
where
    T: Clone + Send + 'static,
{
    /// If this is an unresolved promise, reject it.
    fn drop(&mut self) {
        if self.cell.settle(Err(Error::Abandoned)) {
            tracing::warn!("resolver dropped without settling; promise rejected as abandoned");
        }
    }
}

impl<T> fmt::Debug for Resolver<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.inner.cell)
            .finish()
    }
}
