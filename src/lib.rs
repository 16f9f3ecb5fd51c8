//! Thread-safe promises with bluebird-style combinators.
//!
//! A [`Promise`] holds a value that becomes available at most once, through
//! exactly one of three outcomes: resolved, rejected or canceled. Handlers are
//! never run on the caller's stack; every continuation is submitted to an
//! execution [`Context`] chosen per call, such as a [`DispatchQueue`].
//!
//! - State engine: [`Promise::new`], [`Promise::with_cancel`],
//!   [`Promise::adopt`], [`Promise::cancel`], [`Resolver`]
//! - Chaining: `then`, `catch`, `recover`, `tap`, `tap_catch`, `finally`,
//!   `reflect`, `as_void`
//! - Aggregates: [`all`], [`any`], [`race`], [`join`], [`map`],
//!   [`map_series`], [`reduce`]
//! - Time and control: [`delay`], [`Promise::timeout`], [`defer`]
//! - Async bridge: [`Promise::value`]
//!
//! ```
//! use bluebird::{all, delay, DispatchQueue, Error};
//! use futures::executor::block_on;
//! use std::time::Duration;
//!
//! let queue = DispatchQueue::shared("example").unwrap();
//! let prices = all(&queue, vec![
//!     delay(&queue, Duration::from_millis(20), 3),
//!     delay(&queue, Duration::from_millis(5), 4),
//! ]);
//! let total = prices
//!     .then(&queue, |prices| Ok(prices.iter().sum::<i32>()))
//!     .recover(&queue, |_: Error| Ok(0));
//! assert_eq!(block_on(total.value(&queue)).unwrap(), 7);
//! ```
pub mod aggregate;
pub mod bridge;
pub mod chain;
pub mod context;
pub mod deferred;
pub mod error;
pub mod queue;
pub mod state;
pub mod time;

pub use aggregate::{all, any, join, join3, join4, map, map_series, race, reduce};
pub use bridge::Value;
pub use chain::Reflection;
pub use context::{Context, SharedContext, Task};
pub use deferred::{defer, Deferred};
pub use error::Error;
pub use queue::{DispatchQueue, QueueBuilder};
pub use state::{attempt, CancelHook, Promise, PromiseState, Resolver};
pub use time::{delay, delay_promise};
