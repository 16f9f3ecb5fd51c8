//! The execution context abstraction promises dispatch their handlers onto.
//!
//! The promise core never creates threads. Every continuation is handed to a
//! [`Context`] chosen by the caller, which decides where and when it runs.
//! [`DispatchQueue`](crate::DispatchQueue) is a ready-made implementation.
use std::sync::Arc;
use std::time::Duration;

/// A unit of work submitted to a [`Context`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The form in which contexts are passed to combinators and stored in handlers.
pub type SharedContext = Arc<dyn Context>;

/// An asynchronous callback submission surface.
///
/// Implementations must return from both methods without running the task
/// on the caller's stack: promises submit handlers while holding their own
/// lock.
pub trait Context: Send + Sync {
    /// Schedules `task` to run as soon as possible.
    fn submit(&self, task: Task);

    /// Schedules `task` to run no earlier than `delay` from now.
    fn submit_after(&self, delay: Duration, task: Task);
}
