//! Bridges callback-based operations into [`Promise`]s.
//!
//! A wrapped operation is started once by a *starter* closure, which receives
//! a [`Completion`] to hand to the operation as its callback. The callback's
//! argument shape is a type parameter, picked once per wrapped operation, so
//! the mapping from arguments to an outcome is fixed at compile time:
//!
//! ```
//! use promise_bridge::{adapt, ErrorLast};
//!
//! // An API in the (value, error) convention.
//! fn account_status(done: impl FnOnce(Option<u8>, Option<&'static str>)) {
//!     done(Some(1), None);
//! }
//!
//! let status = adapt::<ErrorLast<u8, &'static str>, _>(|completion| {
//!     account_status(move |value, error| {
//!         completion.complete((value, error));
//!     });
//! });
//! assert_eq!(status.value(), Some(1));
//! ```

use crate::cell::Outcome;
use crate::error::{catch_panic, BoxError, StarterPanic};
use crate::{Error, Promise, Resolver};
use std::fmt;
use std::marker::PhantomData;

/// One completion-handler convention.
pub trait Shape: 'static {
    /// What the callback is invoked with.
    type Args;
    type Output: Clone + Send + 'static;

    fn classify(args: Self::Args) -> Outcome<Self::Output>;
}

/// `completion()`: success with no payload.
#[derive(Debug)]
pub enum Nullary {}

impl Shape for Nullary {
    type Args = ();
    type Output = ();

    fn classify(_: ()) -> Outcome<()> {
        Ok(())
    }
}

/// `completion(value)`: always a success.
pub struct Value<T>(PhantomData<fn() -> T>);

impl<T> Shape for Value<T>
where
    T: Clone + Send + 'static,
{
    type Args = T;
    type Output = T;

    fn classify(value: T) -> Outcome<T> {
        Ok(value)
    }
}

/// `completion(value_or_error)`: a single argument that is either.
pub struct ValueOrError<T, E>(PhantomData<fn() -> (T, E)>);

impl<T, E> Shape for ValueOrError<T, E>
where
    T: Clone + Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Args = Result<T, E>;
    type Output = T;

    fn classify(args: Result<T, E>) -> Outcome<T> {
        args.map_err(Error::upstream)
    }
}

/// `completion(error?)`: absence of an error means success.
pub struct ErrorOnly<E>(PhantomData<fn() -> E>);

impl<E> Shape for ErrorOnly<E>
where
    E: Into<BoxError> + 'static,
{
    type Args = Option<E>;
    type Output = ();

    fn classify(error: Option<E>) -> Outcome<()> {
        match error {
            Some(err) => Err(Error::upstream(err)),
            None => Ok(()),
        }
    }
}

/// `completion(value?, error?)`: a present error wins over a present value.
pub struct ErrorLast<T, E>(PhantomData<fn() -> (T, E)>);

impl<T, E> Shape for ErrorLast<T, E>
where
    T: Clone + Send + 'static,
    E: Into<BoxError> + 'static,
{
    type Args = (Option<T>, Option<E>);
    type Output = T;

    fn classify(args: (Option<T>, Option<E>)) -> Outcome<T> {
        match args {
            (_, Some(err)) => Err(Error::upstream(err)),
            (Some(value), None) => Ok(value),
            (None, None) => Err(Error::Shape("completion supplied neither a value nor an error")),
        }
    }
}

/// `completion(success, error?)`: a present error wins, then the flag decides.
pub struct BoolSuccess<E>(PhantomData<fn() -> E>);

impl<E> Shape for BoolSuccess<E>
where
    E: Into<BoxError> + 'static,
{
    type Args = (bool, Option<E>);
    type Output = ();

    fn classify(args: (bool, Option<E>)) -> Outcome<()> {
        match args {
            (_, Some(err)) => Err(Error::upstream(err)),
            (true, None) => Ok(()),
            (false, None) => Err(Error::Denied),
        }
    }
}

/// The callback handed to a wrapped operation.
///
/// Calls after the first are absorbed: some platform APIs may invoke their
/// completion handler more than once.
pub struct Completion<S: Shape> {
    resolver: Resolver<S::Output>,
}

impl<S: Shape> Completion<S> {
    pub fn complete(&self, args: S::Args) -> bool {
        self.resolver.resolve(S::classify(args))
    }

    /// Convert into a plain closure for APIs that take `Fn(Args)`.
    pub fn into_callback(self) -> impl Fn(S::Args) + Clone + Send + Sync + 'static {
        move |args| {
            self.complete(args);
        }
    }
}

impl<S: Shape> Clone for Completion<S> {
    fn clone(&self) -> Self {
        Completion {
            resolver: self.resolver.clone(),
        }
    }
}

impl<S: Shape> fmt::Debug for Completion<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// Start a callback-based operation and return a promise of its result.
///
/// `starter` runs exactly once, synchronously. A panic inside it rejects the
/// promise with [`Error::Starter`]. If every clone of the [`Completion`] is
/// dropped without being called, the promise is rejected with
/// [`Error::Abandoned`]; a completion that is kept but never called leaves it
/// pending.
pub fn adapt<S, F>(starter: F) -> Promise<S::Output>
where
    S: Shape,
    F: FnOnce(Completion<S>),
{
    try_adapt::<S, _, std::convert::Infallible>(move |completion| {
        starter(completion);
        Ok(())
    })
}

/// Like [`adapt`], for starters that can fail before the operation begins.
/// An `Err` from `starter` rejects the promise with [`Error::Starter`].
pub fn try_adapt<S, F, E>(starter: F) -> Promise<S::Output>
where
    S: Shape,
    F: FnOnce(Completion<S>) -> Result<(), E>,
    E: Into<BoxError>,
{
    let (promise, resolver) = Promise::<S::Output>::pending();
    // Held across the call so a failing starter is not reported as abandoned.
    let failure = resolver.clone();
    let failed = match catch_panic(move || starter(Completion { resolver })) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(Error::starter(err)),
        Err(message) => Some(Error::starter(StarterPanic(message))),
    };
    if let Some(err) = failed {
        tracing::debug!(error = %err, "starter failed before completing");
        failure.reject(err);
    }
    promise
}
