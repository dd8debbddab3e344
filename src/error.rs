use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Boxed error accepted from wrapped operations.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Why a promise was rejected.
///
/// `Error` is `Clone` so that every continuation observing a rejected promise
/// receives its own copy.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The wrapped operation reported a failure through its completion handler.
    #[error("{0}")]
    Upstream(Arc<dyn StdError + Send + Sync>),
    /// The completion handler was called with arguments that fit no outcome.
    #[error("unrecognized completion shape: {0}")]
    Shape(&'static str),
    /// The starter failed before the operation could complete.
    #[error("operation failed to start: {0}")]
    Starter(Arc<dyn StdError + Send + Sync>),
    /// A boolean-success completion reported failure without an error value.
    #[error("operation reported failure without an error")]
    Denied,
    /// A chained handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// The promise was cancelled locally with [`Promise::cancel`](crate::Promise::cancel).
    #[error("promise was cancelled")]
    Cancelled,
    /// Every resolver for the promise was dropped while it was still pending.
    #[error("promise abandoned: resolver dropped without settling")]
    Abandoned,
}

impl Error {
    pub fn upstream(err: impl Into<BoxError>) -> Self {
        Error::Upstream(Arc::from(err.into()))
    }

    pub fn starter(err: impl Into<BoxError>) -> Self {
        Error::Starter(Arc::from(err.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Borrow the wrapped upstream or starter error as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Error::Upstream(inner) | Error::Starter(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Panic raised by a starter, carried inside [`Error::Starter`].
#[derive(Debug, Error)]
#[error("starter panicked: {0}")]
pub struct StarterPanic(pub String);

/// Run `f`, turning a panic into its message.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
