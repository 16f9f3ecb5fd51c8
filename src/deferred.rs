use crate::error::Error;
use crate::state::{Promise, Resolver};

/// A pending promise together with the means to settle it, for wiring
/// completion signals that do not fit inside a constructor closure.
///
/// # Examples
///
/// ```
/// use bluebird::{defer, DispatchQueue};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let queue = DispatchQueue::shared("docs").unwrap();
/// let deferred = defer::<String>();
/// let promise = deferred.promise().clone();
/// let task = thread::spawn(move || deferred.resolve("Hi".into()));
/// assert_eq!(block_on(promise.value(&queue)).unwrap(), "Hi");
/// task.join().expect("The task thread has panicked.");
/// ```
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    promise: Promise<T>,
    resolver: Resolver<T>,
}

/// Creates a pending [`Deferred`] handle.
pub fn defer<T: Clone + Send + 'static>() -> Deferred<T> {
    let (promise, resolver) = Promise::pending();
    Deferred { promise, resolver }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    pub fn resolver(&self) -> Resolver<T> {
        self.resolver.clone()
    }

    pub fn resolve(&self, value: T) {
        self.resolver.resolve(value);
    }

    pub fn reject(&self, error: Error) {
        self.resolver.reject(error);
    }

    pub fn into_parts(self) -> (Promise<T>, Resolver<T>) {
        (self.promise, self.resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DispatchQueue;
    use futures::executor::block_on;
    use std::thread;

    #[test]
    fn test_defer_resolve() {
        let q = DispatchQueue::shared("deferred-test").unwrap();
        let deferred = defer::<u32>();
        let promise = deferred.promise().clone();
        let resolver = deferred.resolver();
        thread::spawn(move || resolver.resolve(5)).join().unwrap();
        assert_eq!(block_on(promise.value(&q)).unwrap(), 5);
    }

    #[test]
    fn test_defer_reject_then_resolve_is_ignored() {
        let deferred = defer::<u32>();
        deferred.reject(Error::msg("first"));
        deferred.resolve(1);
        let (promise, _) = deferred.into_parts();
        assert_eq!(promise.error().unwrap().to_string(), "first");
        assert!(promise.result().is_none());
    }
}
