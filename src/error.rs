use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The rejection value carried by a [`Promise`](crate::Promise).
///
/// Rejections fan out to every handler registered on a promise, so the error
/// is cheap to clone: producer-supplied errors are kept behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An opaque error supplied by the producer, passed through unchanged.
    #[error("{0}")]
    User(Arc<dyn std::error::Error + Send + Sync>),
    /// An aggregate combinator that needs at least one input received none.
    #[error("aggregate combinator received no inputs")]
    EmptyInput,
    /// The promise did not settle within the given duration.
    #[error("promise timed out after {0:?}")]
    Timeout(Duration),
    /// The promise was canceled before it settled.
    #[error("promise was canceled")]
    Canceled,
    /// A user-supplied closure panicked while producing a value.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// Every handle able to settle the promise was dropped while it was pending.
    #[error("promise was dropped before it settled")]
    Abandoned,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl Error {
    /// Wraps any error type as a [`Error::User`] rejection.
    pub fn user<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::User(Arc::new(err))
    }

    /// A [`Error::User`] rejection carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::user(Message(message.into()))
    }

    /// Borrows the producer-supplied error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::User(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Runs user code, turning both an `Err` return and a panic into an `Err`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
