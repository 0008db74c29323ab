//! Deferred work queue drained once per event-loop tick.
//!
//! The pipeline is driven from a single thread by whatever event loop the
//! application runs. Some state changes must not happen inside the callback
//! that triggers them (a splitter must not erase a branch while it is
//! iterating its branches), so they are queued here and executed on the next
//! tick, when no pipeline call is on the stack.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Upper bound on ticks executed by [`Reactor::run_until_idle`].
const MAX_IDLE_TICKS: usize = 1024;

type Task = Box<dyn FnOnce()>;

/// A cloneable handle to a deferred task queue.
///
/// All clones share the same queue.
///
/// # Example
///
/// ```
/// use audio_pipe::Reactor;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let reactor = Reactor::new();
/// let ran = Rc::new(Cell::new(false));
/// let flag = ran.clone();
/// reactor.defer(move || flag.set(true));
///
/// assert!(!ran.get());
/// assert_eq!(reactor.run_once(), 1);
/// assert!(ran.get());
/// ```
#[derive(Clone, Default)]
pub struct Reactor {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl Reactor {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` to run on the next tick.
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Number of tasks waiting for a tick.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs one tick.
    ///
    /// Only tasks queued before the tick started are executed; tasks deferred
    /// by those tasks wait for the next tick. Returns the number of tasks run.
    pub fn run_once(&self) -> usize {
        let batch: Vec<Task> = self.queue.borrow_mut().drain(..).collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        if count > 0 {
            tracing::trace!(tasks = count, "reactor tick");
        }
        count
    }

    /// Runs ticks until no task is pending. Returns the total number of
    /// tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_IDLE_TICKS {
            let ran = self.run_once();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
        tracing::warn!(
            pending = self.pending(),
            "reactor still busy after {MAX_IDLE_TICKS} ticks"
        );
        total
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("pending", &self.pending())
            .finish()
    }
}
