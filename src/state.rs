//! The promise state machine and its handler registry.
//!
//! A promise starts `Pending` with an ordered list of handlers and moves to
//! exactly one of `Resolved`, `Rejected` or `Canceled`. The transition and the
//! hand-off of every queued handler to its context happen under one lock, so
//! concurrent settlements always have a single winner and no handler can
//! observe a half-written state.
use crate::context::SharedContext;
use crate::error::{guarded, Error};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A snapshot of where a [`Promise`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Resolved,
    Rejected,
    Canceled,
}

pub(crate) enum State<T> {
    Pending(Vec<Handler<T>>),
    Resolved(T),
    Rejected(Error),
    Canceled,
}

impl<T> State<T> {
    fn snapshot(&self) -> PromiseState {
        match self {
            State::Pending(_) => PromiseState::Pending,
            State::Resolved(_) => PromiseState::Resolved,
            State::Rejected(_) => PromiseState::Rejected,
            State::Canceled => PromiseState::Canceled,
        }
    }
}

impl<T: Clone + Send + 'static> State<T> {
    /// Submits `handler` if it matches this terminal state, drops it otherwise.
    fn dispatch(&self, handler: Handler<T>) {
        match (self, handler) {
            (State::Resolved(value), Handler::Resolve(on, f)) => {
                let value = value.clone();
                on.submit(Box::new(move || f(value)));
            }
            (State::Rejected(error), Handler::Reject(on, f)) => {
                let error = error.clone();
                on.submit(Box::new(move || f(error)));
            }
            (State::Canceled, Handler::Cancel(on, f)) => on.submit(f),
            _ => {}
        }
    }
}

/// A one-shot continuation bound to the context it must run on.
pub(crate) enum Handler<T> {
    Resolve(SharedContext, Box<dyn FnOnce(T) + Send>),
    Reject(SharedContext, Box<dyn FnOnce(Error) + Send>),
    Cancel(SharedContext, Box<dyn FnOnce() + Send>),
}

impl<T> Handler<T> {
    pub(crate) fn resolve(on: &SharedContext, f: impl FnOnce(T) + Send + 'static) -> Self {
        Handler::Resolve(on.clone(), Box::new(f))
    }

    pub(crate) fn reject(on: &SharedContext, f: impl FnOnce(Error) + Send + 'static) -> Self {
        Handler::Reject(on.clone(), Box::new(f))
    }

    pub(crate) fn cancel(on: &SharedContext, f: impl FnOnce() + Send + 'static) -> Self {
        Handler::Cancel(on.clone(), Box::new(f))
    }
}

/// A closure shared by several handlers of which at most one may run it.
pub(crate) struct OneShot<F>(Mutex<Option<F>>);

impl<F> OneShot<F> {
    pub(crate) fn new(f: F) -> Arc<Self> {
        Arc::new(OneShot(Mutex::new(Some(f))))
    }

    pub(crate) fn take(&self) -> Option<F> {
        self.0.lock().take()
    }
}

/// A value that becomes available at most once, at some later time.
///
/// `Promise` is a handle: clones refer to the same underlying state. Every
/// combinator returns a new promise wired into the receiver's handler list
/// and never blocks the caller.
///
/// # Examples
///
/// ```
/// use bluebird::{DispatchQueue, Promise};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let queue = DispatchQueue::shared("docs").unwrap();
/// let promise = Promise::new(|resolver| {
///     thread::spawn(move || resolver.resolve(21));
///     Ok(())
/// });
/// let doubled = promise.then(&queue, |n| Ok(n * 2));
/// assert_eq!(block_on(doubled.value(&queue)).unwrap(), 42);
/// ```
pub struct Promise<T> {
    inner: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Promise<T> {
    pub fn state(&self) -> PromiseState {
        self.inner.lock().snapshot()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == PromiseState::Canceled
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    fn with_state(state: State<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// A promise that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with_state(State::Resolved(value))
    }

    /// A promise that is already rejected with `error`.
    pub fn rejected(error: Error) -> Self {
        Self::with_state(State::Rejected(error))
    }

    pub(crate) fn pending() -> (Self, Resolver<T>) {
        let promise = Self::with_state(State::Pending(Vec::new()));
        let resolver = Resolver {
            promise: promise.clone(),
        };
        (promise, resolver)
    }

    /// Runs `resolver` synchronously with a [`Resolver`] for the new promise.
    ///
    /// The resolver may settle the promise right away or keep the handle and
    /// settle it later from any thread. If it returns an error, or panics, the
    /// promise is rejected with that error unless it already settled.
    pub fn new<F>(resolver: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> Result<(), Error>,
    {
        let (promise, handle) = Self::pending();
        let rejecter = handle.clone();
        if let Err(error) = guarded(|| resolver(handle)) {
            rejecter.reject(error);
        }
        promise
    }

    /// Like [`Promise::new`], also handing out a [`CancelHook`] through which
    /// the producer can register work to run if the promise is canceled while
    /// still pending.
    ///
    /// # Examples
    ///
    /// ```
    /// use bluebird::{DispatchQueue, Promise};
    /// use std::sync::mpsc::channel;
    ///
    /// let queue = DispatchQueue::shared("docs").unwrap();
    /// let (tx, rx) = channel();
    /// let promise = Promise::<u32>::with_cancel(|_resolver, on_cancel| {
    ///     on_cancel.register(&queue, move || tx.send("stopped").unwrap());
    ///     Ok(())
    /// });
    /// promise.cancel();
    /// assert_eq!(rx.recv().unwrap(), "stopped");
    /// ```
    pub fn with_cancel<F>(resolver: F) -> Self
    where
        F: FnOnce(Resolver<T>, CancelHook<T>) -> Result<(), Error>,
    {
        let (promise, handle) = Self::pending();
        let rejecter = handle.clone();
        let hook = CancelHook {
            promise: promise.clone(),
        };
        if let Err(error) = guarded(|| resolver(handle, hook)) {
            rejecter.reject(error);
        }
        promise
    }

    /// A promise mirroring whichever promise `f` returns.
    ///
    /// An error or panic from `f` itself rejects the promise immediately.
    pub fn adopt<F>(on: &SharedContext, f: F) -> Self
    where
        F: FnOnce() -> Result<Promise<T>, Error>,
    {
        match guarded(f) {
            Ok(source) => {
                let (promise, resolver) = Self::pending();
                source.forward_to(on, resolver);
                promise
            }
            Err(error) => Self::rejected(error),
        }
    }

    /// The resolved value, if the promise has resolved.
    pub fn result(&self) -> Option<T> {
        match &*self.inner.lock() {
            State::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection, if the promise has been rejected.
    pub fn error(&self) -> Option<Error> {
        match &*self.inner.lock() {
            State::Rejected(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// The terminal outcome, `None` while pending. Cancellation reads as
    /// [`Error::Canceled`].
    pub(crate) fn outcome(&self) -> Option<Result<T, Error>> {
        match &*self.inner.lock() {
            State::Pending(_) => None,
            State::Resolved(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
            State::Canceled => Some(Err(Error::Canceled)),
        }
    }

    /// Cancels the promise if it is still pending, firing its cancel
    /// handlers. A promise that already resolved or rejected is unaffected.
    pub fn cancel(&self) {
        self.settle(State::Canceled);
    }

    /// Runs `f` on `on` if this promise gets canceled.
    pub fn on_cancel<F>(&self, on: &SharedContext, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_handlers(vec![Handler::cancel(on, f)]);
    }

    fn settle(&self, next: State<T>) {
        let mut state = self.inner.lock();
        let handlers = match &mut *state {
            State::Pending(handlers) => std::mem::take(handlers),
            settled => {
                tracing::trace!(
                    state = ?settled.snapshot(),
                    ignored = ?next.snapshot(),
                    "promise already settled"
                );
                return;
            }
        };
        *state = next;
        tracing::trace!(
            state = ?state.snapshot(),
            handlers = handlers.len(),
            "promise settled"
        );
        for handler in handlers {
            state.dispatch(handler);
        }
    }

    /// Queues `handlers` in order while pending; once settled, submits the
    /// ones matching the terminal state right away and drops the rest.
    pub(crate) fn add_handlers(&self, handlers: Vec<Handler<T>>) {
        let mut state = self.inner.lock();
        match &mut *state {
            State::Pending(queued) => queued.extend(handlers),
            settled => {
                for handler in handlers {
                    settled.dispatch(handler);
                }
            }
        }
    }

    /// Pipes this promise's resolution or rejection into `resolver`.
    pub(crate) fn forward_to(&self, on: &SharedContext, resolver: Resolver<T>) {
        let rejecter = resolver.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolver.resolve(value)),
            Handler::reject(on, move |error| rejecter.reject(error)),
        ]);
    }

    /// Runs `f` once this promise reaches any terminal state.
    pub(crate) fn on_settled<F>(&self, on: &SharedContext, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let f = OneShot::new(f);
        let (rejected, canceled) = (f.clone(), f.clone());
        self.add_handlers(vec![
            Handler::resolve(on, move |_| f.take().into_iter().for_each(|f| f())),
            Handler::reject(on, move |_| rejected.take().into_iter().for_each(|f| f())),
            Handler::cancel(on, move || canceled.take().into_iter().for_each(|f| f())),
        ]);
    }
}

/// The settling half of a pending promise.
///
/// Clones settle the same promise; the first call to [`Resolver::resolve`]
/// or [`Resolver::reject`] across all of them wins and later calls do nothing.
pub struct Resolver<T> {
    promise: Promise<T>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn resolve(&self, value: T) {
        self.promise.settle(State::Resolved(value));
    }

    pub fn reject(&self, error: Error) {
        self.promise.settle(State::Rejected(error));
    }

    /// Resolves on `Ok`, rejects on `Err`.
    pub fn settle(&self, outcome: Result<T, Error>) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }
}

/// Lets a producer register cancel handlers from inside
/// [`Promise::with_cancel`].
pub struct CancelHook<T> {
    promise: Promise<T>,
}

impl<T: Clone + Send + 'static> CancelHook<T> {
    pub fn register<F>(&self, on: &SharedContext, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.promise.on_cancel(on, f);
    }
}

impl<T> fmt::Debug for CancelHook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHook").finish_non_exhaustive()
    }
}

/// Runs `f` synchronously and wraps its outcome in a settled promise.
pub fn attempt<T, F>(f: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<T, Error>,
{
    match guarded(f) {
        Ok(value) => Promise::resolved(value),
        Err(error) => Promise::rejected(error),
    }
}
