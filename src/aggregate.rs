//! Many-to-one and one-to-many combinators.
//!
//! None of these propagate cancellation: canceling an input leaves the
//! aggregate pending, and canceling the aggregate leaves the inputs running.
use crate::context::SharedContext;
use crate::error::{guarded, Error};
use crate::state::{Handler, Promise};
use parking_lot::Mutex;
use std::sync::Arc;

struct Gather<T> {
    remaining: usize,
    slots: Vec<Option<T>>,
}

/// Resolves to every input's value, in input order, once all of them
/// resolve. Rejects with the first rejection observed.
///
/// An empty input resolves immediately to an empty `Vec`.
///
/// # Examples
///
/// ```
/// use bluebird::{all, DispatchQueue, Promise};
/// use futures::executor::block_on;
///
/// let queue = DispatchQueue::shared("docs").unwrap();
/// let both = all(&queue, vec![Promise::resolved(1), Promise::resolved(2)]);
/// assert_eq!(block_on(both.value(&queue)).unwrap(), vec![1, 2]);
/// ```
pub fn all<T, I>(on: &SharedContext, promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::resolved(Vec::new());
    }
    let (combined, resolver) = Promise::pending();
    let gather = Arc::new(Mutex::new(Gather {
        remaining: promises.len(),
        slots: vec![None; promises.len()],
    }));
    for (index, promise) in promises.iter().enumerate() {
        let gather = gather.clone();
        let (done, failed) = (resolver.clone(), resolver.clone());
        promise.add_handlers(vec![
            Handler::resolve(on, move |value| {
                let finished = {
                    let mut gather = gather.lock();
                    gather.slots[index] = Some(value);
                    gather.remaining -= 1;
                    (gather.remaining == 0).then(|| std::mem::take(&mut gather.slots))
                };
                if let Some(slots) = finished {
                    done.resolve(slots.into_iter().flatten().collect());
                }
            }),
            Handler::reject(on, move |error| failed.reject(error)),
        ]);
    }
    combined
}

/// Settles like whichever input settles first, resolved or rejected.
///
/// Rejects immediately with [`Error::EmptyInput`] when there are no inputs.
pub fn any<T, I>(on: &SharedContext, promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::rejected(Error::EmptyInput);
    }
    let (winner, resolver) = Promise::pending();
    for promise in &promises {
        promise.forward_to(on, resolver.clone());
    }
    winner
}

/// Same contract as [`any`], including the empty-input rejection.
pub fn race<T, I>(on: &SharedContext, promises: I) -> Promise<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    any(on, promises)
}

// Only called after `all` resolved over the void-erased inputs, at which
// point every input holds its value.
fn settled<T: Clone + Send + 'static>(promise: &Promise<T>) -> Result<T, Error> {
    promise.outcome().unwrap_or(Err(Error::Abandoned))
}

/// Typed [`all`] over two promises of different types.
pub fn join<A, B>(on: &SharedContext, a: Promise<A>, b: Promise<B>) -> Promise<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    all(on, [a.as_void(on), b.as_void(on)]).then(on, move |_| Ok((settled(&a)?, settled(&b)?)))
}

pub fn join3<A, B, C>(
    on: &SharedContext,
    a: Promise<A>,
    b: Promise<B>,
    c: Promise<C>,
) -> Promise<(A, B, C)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    all(on, [a.as_void(on), b.as_void(on), c.as_void(on)])
        .then(on, move |_| Ok((settled(&a)?, settled(&b)?, settled(&c)?)))
}

pub fn join4<A, B, C, D>(
    on: &SharedContext,
    a: Promise<A>,
    b: Promise<B>,
    c: Promise<C>,
    d: Promise<D>,
) -> Promise<(A, B, C, D)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    D: Clone + Send + 'static,
{
    all(on, [a.as_void(on), b.as_void(on), c.as_void(on), d.as_void(on)]).then(on, move |_| {
        Ok((settled(&a)?, settled(&b)?, settled(&c)?, settled(&d)?))
    })
}

/// Starts `transform` for every item right away and resolves to the results
/// in input order.
///
/// If `transform` fails for any item while the promises are being created,
/// the whole operation rejects with that error and no further items are
/// transformed.
pub fn map<A, B, I, F>(on: &SharedContext, items: I, transform: F) -> Promise<Vec<B>>
where
    B: Clone + Send + 'static,
    I: IntoIterator<Item = A>,
    F: FnMut(A) -> Result<Promise<B>, Error>,
{
    let started = guarded(|| {
        items
            .into_iter()
            .map(transform)
            .collect::<Result<Vec<_>, Error>>()
    });
    match started {
        Ok(promises) => all(on, promises),
        Err(error) => Promise::rejected(error),
    }
}

/// Transforms items one at a time: each transform starts only after the
/// previous item's promise resolved. The first rejection stops the series.
pub fn map_series<A, B, I, F>(on: &SharedContext, items: I, transform: F) -> Promise<Vec<B>>
where
    A: Send + 'static,
    B: Clone + Send + 'static,
    I: IntoIterator<Item = A>,
    F: Fn(A) -> Result<Promise<B>, Error> + Send + Sync + 'static,
{
    let transform = Arc::new(transform);
    items
        .into_iter()
        .fold(Promise::resolved(Vec::new()), |chain, item| {
            let transform = transform.clone();
            let ctx = on.clone();
            chain.then_promise(on, move |mut results| {
                let next = transform(item)?;
                Ok(next.then(&ctx, move |value| {
                    results.push(value);
                    Ok(results)
                }))
            })
        })
}

/// Folds `items` into `initial` one step at a time; a rejection at any step
/// skips the remaining ones.
pub fn reduce<A, B, I, F>(on: &SharedContext, items: I, initial: B, transform: F) -> Promise<B>
where
    A: Send + 'static,
    B: Clone + Send + 'static,
    I: IntoIterator<Item = A>,
    F: Fn(B, A) -> Result<Promise<B>, Error> + Send + Sync + 'static,
{
    let transform = Arc::new(transform);
    items
        .into_iter()
        .fold(Promise::resolved(initial), |partial, item| {
            let transform = transform.clone();
            partial.then_promise(on, move |acc| transform(acc, item))
        })
}

impl<T: Clone + Send + 'static> Promise<Vec<T>> {
    /// [`map`] over the collection this promise resolves to.
    pub fn map_each<B, F>(&self, on: &SharedContext, transform: F) -> Promise<Vec<B>>
    where
        B: Clone + Send + 'static,
        F: FnMut(T) -> Result<Promise<B>, Error> + Send + 'static,
    {
        let ctx = on.clone();
        self.then_promise(on, move |items| Ok(map(&ctx, items, transform)))
    }

    /// [`map_series`] over the collection this promise resolves to.
    pub fn map_series<B, F>(&self, on: &SharedContext, transform: F) -> Promise<Vec<B>>
    where
        B: Clone + Send + 'static,
        F: Fn(T) -> Result<Promise<B>, Error> + Send + Sync + 'static,
    {
        let ctx = on.clone();
        self.then_promise(on, move |items| Ok(map_series(&ctx, items, transform)))
    }

    /// [`reduce`] over the collection this promise resolves to.
    pub fn reduce<B, F>(&self, on: &SharedContext, initial: B, transform: F) -> Promise<B>
    where
        B: Clone + Send + 'static,
        F: Fn(B, T) -> Result<Promise<B>, Error> + Send + Sync + 'static,
    {
        let ctx = on.clone();
        self.then_promise(on, move |items| Ok(reduce(&ctx, items, initial, transform)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{delay, DispatchQueue};
    use futures::executor::block_on;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    fn queue() -> SharedContext {
        DispatchQueue::shared("aggregate-test").unwrap()
    }

    #[test]
    fn test_all_preserves_input_order() {
        let q = queue();
        let slow = delay(&q, Duration::from_millis(30), 1);
        let fast = delay(&q, Duration::from_millis(5), 2);
        let combined = all(&q, vec![slow, fast]);
        assert_eq!(block_on(combined.value(&q)).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_all_empty_resolves_immediately() {
        let q = queue();
        let combined = all(&q, Vec::<Promise<i32>>::new());
        assert_eq!(combined.result(), Some(vec![]));
    }

    #[test]
    fn test_all_rejects_with_first_error() {
        let q = queue();
        let never = Promise::<i32>::new(|_| Ok(()));
        let combined = all(
            &q,
            vec![never.clone(), Promise::rejected(Error::msg("broken")), Promise::resolved(3)],
        );
        assert_eq!(block_on(combined.value(&q)).unwrap_err().to_string(), "broken");
        assert!(never.is_pending());
    }

    #[test]
    fn test_all_across_threads() {
        let q = queue();
        let inputs: Vec<Promise<usize>> = (0..32)
            .map(|i| {
                Promise::new(move |resolver| {
                    std::thread::spawn(move || resolver.resolve(i));
                    Ok(())
                })
            })
            .collect();
        let combined = all(&q, inputs);
        assert_eq!(block_on(combined.value(&q)).unwrap(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_any_and_race_take_first_settlement() {
        let q = queue();
        let p1 = delay(&q, Duration::from_millis(100), 1);
        let p2 = delay(&q, Duration::from_millis(10), 2);
        assert_eq!(block_on(any(&q, vec![p1.clone(), p2.clone()]).value(&q)).unwrap(), 2);
        assert_eq!(block_on(race(&q, vec![p1, p2]).value(&q)).unwrap(), 2);

        let failing = Promise::<i32>::rejected(Error::msg("first"));
        let winner = race(&q, vec![failing, delay(&q, Duration::from_millis(20), 5)]);
        assert_eq!(block_on(winner.value(&q)).unwrap_err().to_string(), "first");
    }

    #[test]
    fn test_any_and_race_reject_empty_input() {
        let q = queue();
        assert!(matches!(
            any(&q, Vec::<Promise<i32>>::new()).error(),
            Some(Error::EmptyInput)
        ));
        assert!(matches!(
            race(&q, Vec::<Promise<i32>>::new()).error(),
            Some(Error::EmptyInput)
        ));
    }

    #[test]
    fn test_join_keeps_types() {
        let q = queue();
        let pair = join(&q, Promise::resolved(1), delay(&q, Duration::from_millis(5), "two"));
        assert_eq!(block_on(pair.value(&q)).unwrap(), (1, "two"));

        let triple = join3(&q, Promise::resolved(1), Promise::resolved('b'), Promise::resolved(3.0));
        assert_eq!(block_on(triple.value(&q)).unwrap(), (1, 'b', 3.0));

        let quad = join4(
            &q,
            Promise::resolved(1u8),
            Promise::resolved("b"),
            Promise::resolved(vec![3]),
            Promise::resolved(false),
        );
        assert_eq!(block_on(quad.value(&q)).unwrap(), (1u8, "b", vec![3], false));
    }

    #[test]
    fn test_join_rejects_when_any_input_rejects() {
        let q = queue();
        let pair = join(&q, Promise::resolved(1), Promise::<u8>::rejected(Error::msg("no")));
        assert_eq!(block_on(pair.value(&q)).unwrap_err().to_string(), "no");
    }

    #[test]
    fn test_map_concurrent_keeps_order() {
        let q = queue();
        let ctx = q.clone();
        let mapped = map(&q, vec![30u64, 1, 10], move |ms| {
            Ok(delay(&ctx, Duration::from_millis(ms), ms * 2))
        });
        assert_eq!(block_on(mapped.value(&q)).unwrap(), vec![60, 2, 20]);
    }

    #[test]
    fn test_map_sync_failure_rejects_immediately() {
        let q = queue();
        let mut calls = 0;
        let mapped = map(&q, vec![1, 2, 3], |n| {
            calls += 1;
            if n == 2 {
                Err(Error::msg("two is bad"))
            } else {
                Ok(Promise::resolved(n))
            }
        });
        assert_eq!(calls, 2);
        assert_eq!(mapped.error().unwrap().to_string(), "two is bad");
    }

    #[test]
    fn test_map_series_runs_in_order() {
        let q = queue();
        let (tx, rx) = channel();
        let ctx = q.clone();
        let mapped = map_series(&q, vec!["a", "b", "c"], move |item| {
            tx.send(format!("start {}", item)).unwrap();
            let tx = tx.clone();
            Ok(delay(&ctx, Duration::from_millis(5), item).tap(&ctx, move |item| {
                tx.send(format!("end {}", item)).unwrap();
                Ok(())
            }))
        });
        assert_eq!(block_on(mapped.value(&q)).unwrap(), vec!["a", "b", "c"]);
        let log: Vec<String> = rx.try_iter().collect();
        assert_eq!(
            log,
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
    }

    #[test]
    fn test_map_series_stops_on_rejection() {
        let q = queue();
        let (tx, rx) = channel();
        let mapped = map_series(&q, vec![1, 2, 3], move |n| {
            tx.send(n).unwrap();
            if n == 2 {
                Err(Error::msg("stop"))
            } else {
                Ok(Promise::resolved(n))
            }
        });
        assert_eq!(block_on(mapped.value(&q)).unwrap_err().to_string(), "stop");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_reduce_sums_sequentially() {
        let q = queue();
        let sum = reduce(&q, vec![1, 2, 3], 0, |acc, x| Ok(Promise::resolved(acc + x)));
        assert_eq!(block_on(sum.value(&q)).unwrap(), 6);
    }

    #[test]
    fn test_reduce_aborts_on_error() {
        let q = queue();
        let (tx, rx) = channel();
        let sum = reduce(&q, vec![1, 2, 3], 0, move |acc, x| {
            tx.send(x).unwrap();
            if x == 2 {
                Ok(Promise::rejected(Error::msg("halt")))
            } else {
                Ok(Promise::resolved(acc + x))
            }
        });
        assert_eq!(block_on(sum.value(&q)).unwrap_err().to_string(), "halt");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_collection_methods() {
        let q = queue();
        let items = Promise::resolved(vec![1, 2, 3]);
        let doubled = items.map_each(&q, |n| Ok(Promise::resolved(n * 2)));
        assert_eq!(block_on(doubled.value(&q)).unwrap(), vec![2, 4, 6]);

        let strings = items.map_series(&q, |n| Ok(Promise::resolved(n.to_string())));
        assert_eq!(block_on(strings.value(&q)).unwrap(), vec!["1", "2", "3"]);

        let product = items.reduce(&q, 1, |acc, n| Ok(Promise::resolved(acc * n)));
        assert_eq!(block_on(product.value(&q)).unwrap(), 6);
    }
}
