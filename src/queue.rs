//! A serial dispatch queue backed by a single worker thread.
//!
//! Tasks submitted with [`Context::submit`] run in FIFO order. Tasks submitted
//! with [`Context::submit_after`] are held in a timer heap and join the FIFO
//! once their deadline passes, ordered by deadline and then by submission.
//!
//! # Examples
//!
//! ```
//! use bluebird::{Context, DispatchQueue};
//! use std::sync::mpsc::channel;
//!
//! let queue = DispatchQueue::builder().label("example").spawn().unwrap();
//! let (tx, rx) = channel();
//! queue.submit(Box::new(move || tx.send("ran").unwrap()));
//! assert_eq!(rx.recv().unwrap(), "ran");
//! ```
use crate::context::{Context, SharedContext, Task};
use crate::error::panic_message;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_LABEL: &str = "bluebird.queue";

/// Configures and spawns a [`DispatchQueue`].
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    label: String,
    stack_size: Option<usize>,
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_owned(),
            stack_size: None,
        }
    }
}

impl QueueBuilder {
    /// Names the queue; the worker thread carries the same name.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Stack size for the worker thread, in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Starts the worker thread.
    pub fn spawn(self) -> io::Result<DispatchQueue> {
        let shared = Arc::new(Shared {
            label: self.label,
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
        });
        let mut builder = thread::Builder::new().name(shared.label.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let worker = shared.clone();
        builder.spawn(move || run(worker))?;
        Ok(DispatchQueue {
            handle: Arc::new(Handle { shared }),
        })
    }
}

/// A serial [`Context`] running tasks one at a time on its own thread.
///
/// Cloning is cheap and every clone feeds the same worker. Once the last
/// clone is dropped the worker finishes the queued tasks and timers, then
/// exits.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    handle: Arc<Handle>,
}

impl DispatchQueue {
    /// Spawns a queue with the default configuration.
    pub fn new() -> io::Result<Self> {
        Self::builder().spawn()
    }

    pub fn builder() -> QueueBuilder {
        QueueBuilder::default()
    }

    /// Spawns a labelled queue already wrapped as a [`SharedContext`].
    pub fn shared(label: impl Into<String>) -> io::Result<SharedContext> {
        Ok(Arc::new(Self::builder().label(label).spawn()?))
    }

    pub fn label(&self) -> &str {
        &self.handle.shared.label
    }
}

impl Context for DispatchQueue {
    fn submit(&self, task: Task) {
        let shared = &self.handle.shared;
        shared.state.lock().tasks.push_back(task);
        shared.wake.notify_one();
    }

    fn submit_after(&self, delay: Duration, task: Task) {
        if delay.is_zero() {
            return self.submit(task);
        }
        let shared = &self.handle.shared;
        let Some(deadline) = Instant::now().checked_add(delay) else {
            tracing::debug!(label = %shared.label, ?delay, "timer beyond any deadline dropped");
            return;
        };
        {
            let mut state = shared.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.timers.push(Timer { deadline, seq, task });
        }
        shared.wake.notify_one();
    }
}

#[derive(Debug)]
struct Handle {
    shared: Arc<Shared>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

#[derive(Debug)]
struct Shared {
    label: String,
    state: Mutex<QueueState>,
    wake: Condvar,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    timers: BinaryHeap<Timer>,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        while self.timers.peek().map_or(false, |timer| timer.deadline <= now) {
            if let Some(timer) = self.timers.pop() {
                self.tasks.push_back(timer.task);
            }
        }
    }
}

impl std::fmt::Debug for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueState")
            .field("tasks", &self.tasks.len())
            .field("timers", &self.timers.len())
            .field("closed", &self.closed)
            .finish()
    }
}

struct Timer {
    deadline: Instant,
    seq: u64,
    task: Task,
}

// Reversed so the std max-heap pops the earliest deadline first.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

fn run(shared: Arc<Shared>) {
    tracing::debug!(label = %shared.label, "dispatch queue started");
    while let Some(task) = next_task(&shared) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            tracing::warn!(
                label = %shared.label,
                panic = %panic_message(payload.as_ref()),
                "dispatch queue task panicked"
            );
        }
    }
    tracing::debug!(label = %shared.label, "dispatch queue stopped");
}

/// Blocks until a task is runnable, or returns `None` once the queue is
/// closed and fully drained.
fn next_task(shared: &Shared) -> Option<Task> {
    let mut state = shared.state.lock();
    loop {
        state.promote_due(Instant::now());
        if let Some(task) = state.tasks.pop_front() {
            return Some(task);
        }
        match state.timers.peek().map(|timer| timer.deadline) {
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
            None if state.closed => return None,
            None => shared.wake.wait(&mut state),
        }
    }
}
