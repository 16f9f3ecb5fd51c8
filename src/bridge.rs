//! Awaiting a promise from async code.
//!
//! The adapter registers one resolve/reject/cancel triple on the promise and
//! parks the awaiting task's waker until one of them fires.
use crate::context::SharedContext;
use crate::error::Error;
use crate::state::{Handler, Promise};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Slot<T> {
    outcome: Option<Result<T, Error>>,
    waker: Result<Waker, WakerState>,
}

/// A future resolving to a promise's outcome, created by [`Promise::value`].
///
/// Resolves to `Ok` with the value, or `Err` with the rejection.
/// Cancellation surfaces as [`Error::Canceled`], and a promise dropped while
/// still pending (so that nothing can settle it any more) as
/// [`Error::Abandoned`].
pub struct Value<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Value")
            .field("ready", &slot.outcome.is_some())
            .field("waker", &slot.waker.as_ref().err())
            .finish()
    }
}

/// Shared by the three registered handlers; whichever fires first delivers.
/// Dropping the last one without delivering taints the slot.
struct Notifier<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Notifier<T> {
    fn deliver(&self, outcome: Result<T, Error>) {
        let mut slot = self.slot.lock();
        if let Err(WakerState::Tainted) = slot.waker {
            return;
        }
        slot.outcome = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T> Drop for Notifier<T> {
    /// If nothing was delivered, wake the consumer so it observes abandonment.
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// A future completing with this promise's outcome. The internal
    /// handlers run on `on`.
    pub fn value(&self, on: &SharedContext) -> Value<T> {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let resolved = Arc::new(Notifier { slot: slot.clone() });
        let (rejected, canceled) = (resolved.clone(), resolved.clone());
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolved.deliver(Ok(value))),
            Handler::reject(on, move |error| rejected.deliver(Err(error))),
            Handler::cancel(on, move || canceled.deliver(Err(Error::Canceled))),
        ]);
        Value { slot }
    }
}

impl<T> Future for Value<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => match std::mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => {
                    slot.waker = Err(WakerState::Tainted);
                    Poll::Ready(Err(Error::Abandoned))
                }
                _ => Poll::Pending,
            },
        }
    }
}
