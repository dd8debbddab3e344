//! Thread-safe promises for callback-based asynchronous APIs.
//!
//! A [`Promise`] settles exactly once, from any thread, to a value or an
//! [`Error`]. Continuations can be attached before or after settlement and
//! each runs exactly once. [`adapt`] turns an operation that reports through
//! a completion handler into a promise, whatever the handler's argument
//! convention; see [`Shape`] for the supported conventions.
//!
//! # Examples
//!
//! ```
//! use promise_bridge::{adapt, all, ErrorLast, Promise};
//! use futures::executor::block_on;
//! use std::thread;
//!
//! fn fetch(id: u32, done: impl FnOnce(Option<String>, Option<String>) + Send + 'static) {
//!     thread::spawn(move || done(Some(format!("record {id}")), None));
//! }
//!
//! let records = all((1..=3).map(|id| {
//!     adapt::<ErrorLast<String, String>, _>(move |completion| {
//!         fetch(id, move |value, error| {
//!             completion.complete((value, error));
//!         })
//!     })
//! }));
//! let records = block_on(async { records.await }).unwrap();
//! assert_eq!(records, ["record 1", "record 2", "record 3"]);
//! ```

pub mod adapter;
mod cell;
pub mod combinators;
mod error;
mod promise;
mod resolver;

pub use adapter::{
    adapt, try_adapt, BoolSuccess, Completion, ErrorLast, ErrorOnly, Nullary, Shape, Value,
    ValueOrError,
};
pub use cell::{Continuation, Outcome};
pub use combinators::{after, all, all_settled, join2, join3, race};
pub use error::{BoxError, Error, StarterPanic};
pub use promise::{Promise, Wait};
pub use resolver::Resolver;
