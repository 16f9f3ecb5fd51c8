//! Timer-driven utilities built on [`crate::Context::submit_after`].
use crate::context::SharedContext;
use crate::error::Error;
use crate::state::Promise;
use std::time::Duration;

/// Resolves to `value` no earlier than `duration` from now.
pub fn delay<T>(on: &SharedContext, duration: Duration, value: T) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    let (promise, resolver) = Promise::pending();
    on.submit_after(duration, Box::new(move || resolver.resolve(value)));
    promise
}

/// Waits for `promise` to resolve, then delays its value by `duration`.
/// Rejections are forwarded without delay.
pub fn delay_promise<T>(on: &SharedContext, duration: Duration, promise: Promise<T>) -> Promise<T>
where
    T: Clone + Send + 'static,
{
    let ctx = on.clone();
    promise.then_promise(on, move |value| Ok(delay(&ctx, duration, value)))
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// See [`delay_promise`].
    pub fn delay(&self, on: &SharedContext, duration: Duration) -> Promise<T> {
        delay_promise(on, duration, self.clone())
    }

    /// Forwards this promise's outcome if it settles within `duration`,
    /// otherwise rejects with `error`, or [`Error::Timeout`] when none is
    /// given.
    ///
    /// # Examples
    ///
    /// ```
    /// use bluebird::{DispatchQueue, Error, Promise};
    /// use futures::executor::block_on;
    /// use std::time::Duration;
    ///
    /// let queue = DispatchQueue::shared("docs").unwrap();
    /// let stuck = Promise::<u8>::new(|_| Ok(()));
    /// let bounded = stuck.timeout(&queue, Duration::from_millis(10), None);
    /// assert!(matches!(block_on(bounded.value(&queue)), Err(Error::Timeout(_))));
    /// ```
    pub fn timeout(&self, on: &SharedContext, duration: Duration, error: Option<Error>) -> Promise<T> {
        let (bounded, resolver) = Promise::pending();
        self.forward_to(on, resolver.clone());
        on.submit_after(
            duration,
            Box::new(move || resolver.reject(error.unwrap_or(Error::Timeout(duration)))),
        );
        bounded
    }
}
