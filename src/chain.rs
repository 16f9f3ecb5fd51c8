//! One-to-one combinators: each wires a new promise into the receiver's
//! handler list and returns it immediately.
use crate::context::SharedContext;
use crate::error::{guarded, Error};
use crate::state::{Handler, OneShot, Promise};

/// The outcome of a promise, captured by [`Promise::reflect`] so that a
/// rejection can be inspected without failing the chain.
#[derive(Debug, Clone)]
pub enum Reflection<T> {
    Resolved(T),
    Rejected(Error),
}

impl<T> Reflection<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Reflection::Resolved(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Reflection::Rejected(_))
    }

    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Reflection::Resolved(value) => Ok(value),
            Reflection::Rejected(error) => Err(error),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Transforms the resolved value on `on`.
    ///
    /// A rejection is forwarded untouched and `f` never runs. An `Err` or a
    /// panic from `f` rejects the returned promise.
    pub fn then<U, F>(&self, on: &SharedContext, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let rejecter = resolver.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolver.settle(guarded(|| f(value)))),
            Handler::reject(on, move |error| rejecter.reject(error)),
        ]);
        next
    }

    /// Like [`Promise::then`] for transforms that produce another promise;
    /// the returned promise adopts whatever that promise settles to.
    pub fn then_promise<U, F>(&self, on: &SharedContext, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Promise<U>, Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let rejecter = resolver.clone();
        let ctx = on.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| match guarded(|| f(value)) {
                Ok(inner) => inner.forward_to(&ctx, resolver),
                Err(error) => resolver.reject(error),
            }),
            Handler::reject(on, move |error| rejecter.reject(error)),
        ]);
        next
    }

    /// Handles a rejection. The returned promise resolves to `()` when this
    /// one resolves or when `f` succeeds, and rejects with `f`'s error
    /// otherwise.
    pub fn catch<F>(&self, on: &SharedContext, f: F) -> Promise<()>
    where
        F: FnOnce(Error) -> Result<(), Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let handled = resolver.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |_| resolver.resolve(())),
            Handler::reject(on, move |error| handled.settle(guarded(|| f(error)))),
        ]);
        next
    }

    /// Replaces a rejection with the value `f` produces, keeping the type.
    pub fn recover<F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T, Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let recovered = resolver.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolver.resolve(value)),
            Handler::reject(on, move |error| recovered.settle(guarded(|| f(error)))),
        ]);
        next
    }

    pub fn recover_promise<F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<Promise<T>, Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let recovered = resolver.clone();
        let ctx = on.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolver.resolve(value)),
            Handler::reject(on, move |error| match guarded(|| f(error)) {
                Ok(inner) => inner.forward_to(&ctx, recovered),
                Err(error) => recovered.reject(error),
            }),
        ]);
        next
    }

    /// Runs a side effect on the resolved value, then resolves to that same
    /// value. A failing side effect rejects the chain.
    pub fn tap<F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        F: FnOnce(&T) -> Result<(), Error> + Send + 'static,
    {
        self.then(on, move |value| {
            f(&value)?;
            Ok(value)
        })
    }

    /// Like [`Promise::tap`], waiting for the side effect's promise to
    /// resolve before passing the original value on.
    pub fn tap_promise<A, F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        A: Clone + Send + 'static,
        F: FnOnce(&T) -> Result<Promise<A>, Error> + Send + 'static,
    {
        let ctx = on.clone();
        self.then_promise(on, move |value| {
            let effect = f(&value)?;
            Ok(effect.then(&ctx, move |_| Ok(value)))
        })
    }

    /// Runs a side effect on a rejection. The chain rejects with the original
    /// error whatever the side effect does.
    pub fn tap_catch<F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        F: FnOnce(&Error) -> Result<(), Error> + Send + 'static,
    {
        self.tap_catch_promise(on, move |error| {
            f(error)?;
            Ok(Promise::resolved(()))
        })
    }

    pub fn tap_catch_promise<A, F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        A: Clone + Send + 'static,
        F: FnOnce(&Error) -> Result<Promise<A>, Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let rejecter = resolver.clone();
        let ctx = on.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolver.resolve(value)),
            Handler::reject(on, move |error| match guarded(|| f(&error)) {
                Ok(effect) => effect.on_settled(&ctx, move || rejecter.reject(error)),
                Err(_) => rejecter.reject(error),
            }),
        ]);
        next
    }

    /// Runs `f` once on either path, then re-surfaces the original outcome.
    /// If `f` fails its error replaces the outcome.
    pub fn finally<F>(&self, on: &SharedContext, f: F) -> Promise<T>
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        let rejecter = resolver.clone();
        let on_resolve = OneShot::new(f);
        let on_reject = on_resolve.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| {
                if let Some(f) = on_resolve.take() {
                    resolver.settle(guarded(f).map(|()| value));
                }
            }),
            Handler::reject(on, move |error| {
                if let Some(f) = on_reject.take() {
                    rejecter.reject(guarded(f).err().unwrap_or(error));
                }
            }),
        ]);
        next
    }

    /// A promise that always resolves, to a [`Reflection`] of this one.
    pub fn reflect(&self, on: &SharedContext) -> Promise<Reflection<T>> {
        let (next, resolver) = Promise::pending();
        let rejected = resolver.clone();
        self.add_handlers(vec![
            Handler::resolve(on, move |value| resolver.resolve(Reflection::Resolved(value))),
            Handler::reject(on, move |error| rejected.resolve(Reflection::Rejected(error))),
        ]);
        next
    }

    pub fn as_void(&self, on: &SharedContext) -> Promise<()> {
        self.then(on, |_| Ok(()))
    }

    /// Resolves to `value` once this promise resolves.
    pub fn then_return<U>(&self, on: &SharedContext, value: U) -> Promise<U>
    where
        U: Clone + Send + 'static,
    {
        self.then(on, move |_| Ok(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DispatchQueue;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::time::Duration;

    fn queue() -> SharedContext {
        DispatchQueue::shared("chain-test").unwrap()
    }

    #[test]
    fn test_then_transforms_value() {
        let q = queue();
        let p = Promise::resolved(2).then(&q, |v| Ok(v * 10)).then(&q, |v| Ok(v + 5));
        assert_eq!(block_on(p.value(&q)).unwrap(), 25);
    }

    #[test]
    fn test_then_promise_adopts_inner() {
        let q = queue();
        let ctx = q.clone();
        let p = Promise::resolved(3).then_promise(&q, move |v| {
            Ok(crate::delay(&ctx, Duration::from_millis(5), v.to_string()))
        });
        assert_eq!(block_on(p.value(&q)).unwrap(), "3");
    }

    #[test]
    fn test_then_skips_transform_on_rejection() {
        let q = queue();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let p = Promise::<i32>::rejected(Error::msg("first")).then(&q, move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v)
        });
        let err = block_on(p.value(&q)).unwrap_err();
        assert_eq!(err.to_string(), "first");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_then_error_and_panic_reject() {
        let q = queue();
        let failed = Promise::resolved(1).then(&q, |_| Err::<i32, _>(Error::msg("bad")));
        assert_eq!(block_on(failed.value(&q)).unwrap_err().to_string(), "bad");

        let panicked = Promise::resolved(1).then(&q, |_| -> Result<i32, Error> { panic!("oops") });
        assert!(matches!(block_on(panicked.value(&q)), Err(Error::Panicked(_))));
    }

    #[test]
    fn test_catch_runs_only_on_rejection() {
        let q = queue();
        let (tx, rx) = channel();
        let handled = Promise::<i32>::rejected(Error::msg("boom")).catch(&q, move |e| {
            tx.send(e.to_string()).unwrap();
            Ok(())
        });
        assert!(block_on(handled.value(&q)).is_ok());
        assert_eq!(rx.recv().unwrap(), "boom");

        let untouched = Promise::resolved(1).catch(&q, |_| panic!("must not run"));
        assert!(block_on(untouched.value(&q)).is_ok());
    }

    #[test]
    fn test_catch_rethrow_rejects_with_new_error() {
        let q = queue();
        let p = Promise::<i32>::rejected(Error::msg("a")).catch(&q, |_| Err(Error::msg("b")));
        assert_eq!(block_on(p.value(&q)).unwrap_err().to_string(), "b");
    }

    #[test]
    fn test_recover_keeps_type() {
        let q = queue();
        let p = Promise::<i32>::rejected(Error::msg("x"))
            .recover(&q, |_| Ok(10))
            .then(&q, |v| Ok(v + 1));
        assert_eq!(block_on(p.value(&q)).unwrap(), 11);

        let passthrough = Promise::resolved(4).recover(&q, |_| Ok(0));
        assert_eq!(block_on(passthrough.value(&q)).unwrap(), 4);
    }

    #[test]
    fn test_recover_promise() {
        let q = queue();
        let p = Promise::<&str>::rejected(Error::Canceled)
            .recover_promise(&q, |_| Ok(Promise::resolved("fallback")));
        assert_eq!(block_on(p.value(&q)).unwrap(), "fallback");
    }

    #[test]
    fn test_tap_passes_original_value() {
        let q = queue();
        let (tx, rx) = channel();
        let p = Promise::resolved(String::from("hi")).tap(&q, move |s| {
            tx.send(s.len()).unwrap();
            Ok(())
        });
        assert_eq!(block_on(p.value(&q)).unwrap(), "hi");
        assert_eq!(rx.recv().unwrap(), 2);

        let failed = Promise::resolved(String::from("hi"))
            .tap(&q, |_| Err(Error::msg("side effect failed")));
        assert_eq!(block_on(failed.value(&q)).unwrap_err().to_string(), "side effect failed");
        assert!(failed.result().is_none());
    }

    #[test]
    fn test_tap_promise_waits_and_failure_rejects() {
        let q = queue();
        let ctx = q.clone();
        let p = Promise::resolved(1)
            .tap_promise(&q, move |_| Ok(crate::delay(&ctx, Duration::from_millis(5), "side")));
        assert_eq!(block_on(p.value(&q)).unwrap(), 1);

        let failed = Promise::resolved(1)
            .tap_promise(&q, |_| Ok(Promise::<()>::rejected(Error::msg("side failed"))));
        assert_eq!(block_on(failed.value(&q)).unwrap_err().to_string(), "side failed");
    }

    #[test]
    fn test_tap_catch_keeps_original_error() {
        let q = queue();
        let (tx, rx) = channel();
        let p = Promise::<i32>::rejected(Error::msg("original")).tap_catch(&q, move |e| {
            tx.send(e.to_string()).unwrap();
            Err(Error::msg("side effect failed"))
        });
        assert_eq!(block_on(p.value(&q)).unwrap_err().to_string(), "original");
        assert_eq!(rx.recv().unwrap(), "original");

        let side_rejects = Promise::<i32>::rejected(Error::msg("kept"))
            .tap_catch_promise(&q, |_| Ok(Promise::<()>::rejected(Error::msg("other"))));
        assert_eq!(block_on(side_rejects.value(&q)).unwrap_err().to_string(), "kept");

        let resolved = Promise::resolved(8).tap_catch(&q, |_| panic!("must not run"));
        assert_eq!(block_on(resolved.value(&q)).unwrap(), 8);
    }

    #[test]
    fn test_finally_runs_once_on_both_paths() {
        let q = queue();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let ok = Promise::resolved(1).finally(&q, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(block_on(ok.value(&q)).unwrap(), 1);

        let counter = runs.clone();
        let failed = Promise::<i32>::rejected(Error::msg("e")).finally(&q, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(block_on(failed.value(&q)).unwrap_err().to_string(), "e");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finally_error_supersedes() {
        let q = queue();
        let ok = Promise::resolved(1).finally(&q, || Err(Error::msg("cleanup failed")));
        assert_eq!(block_on(ok.value(&q)).unwrap_err().to_string(), "cleanup failed");

        let failed =
            Promise::<i32>::rejected(Error::msg("e")).finally(&q, || Err(Error::msg("worse")));
        assert_eq!(block_on(failed.value(&q)).unwrap_err().to_string(), "worse");
    }

    #[test]
    fn test_reflect_never_rejects() {
        let q = queue();
        let ok = block_on(Promise::resolved(3).reflect(&q).value(&q)).unwrap();
        assert!(ok.is_resolved());
        assert_eq!(ok.into_result().unwrap(), 3);

        let failed = Promise::<i32>::rejected(Error::msg("r")).reflect(&q);
        let reflection = block_on(failed.value(&q)).unwrap();
        assert!(reflection.is_rejected());
        assert_eq!(reflection.into_result().unwrap_err().to_string(), "r");
    }

    #[test]
    fn test_as_void_and_then_return() {
        let q = queue();
        assert!(block_on(Promise::resolved(1).as_void(&q).value(&q)).is_ok());
        let p = Promise::resolved(1).then_return(&q, "replaced");
        assert_eq!(block_on(p.value(&q)).unwrap(), "replaced");
    }
}
