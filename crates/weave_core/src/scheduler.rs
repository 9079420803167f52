//! Deferred tasks on a virtual clock
//!
//! The reconciliation engine itself never suspends. Anything that should
//! happen "later" (typically a state write that re-renders a component) is
//! queued here and executed synchronously when the host advances the clock.
//! Each task runs to completion before the next one starts, so update passes
//! started from tasks can never overlap.
//!
//! ```
//! use std::time::Duration;
//! use weave_core::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new();
//! scheduler.schedule(Duration::from_millis(500), || Ok(()));
//! assert_eq!(scheduler.advance(Duration::from_millis(100)).unwrap(), 0);
//! assert_eq!(scheduler.advance(Duration::from_millis(400)).unwrap(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::error::Result;

/// A deferred unit of work
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Scheduler shared between the shell and components
pub type SharedScheduler = Rc<Scheduler>;

/// Handle to a scheduled task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Virtual-clock task queue
#[derive(Default)]
pub struct Scheduler {
    now: Cell<Duration>,
    next_seq: Cell<u64>,
    /// Ordered by due time, then by scheduling order
    queue: RefCell<BTreeMap<(Duration, u64), Task>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once `delay` has elapsed on the virtual clock
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskId
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.now.get() + delay;
        trace!(task = seq, due_ms = due.as_millis() as u64, "task scheduled");
        self.queue.borrow_mut().insert((due, seq), Box::new(task));
        TaskId(seq)
    }

    /// Drop a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.borrow_mut();
        let key = queue.keys().find(|(_, seq)| *seq == id.0).copied();
        key.and_then(|k| queue.remove(&k)).is_some()
    }

    /// Move the clock forward by `by`, running every task that falls due.
    ///
    /// Tasks scheduled by running tasks are picked up if they fall due
    /// within the same window. Returns the number of tasks executed; the
    /// first task error stops the advance and is returned.
    pub fn advance(&self, by: Duration) -> Result<usize> {
        let target = self.now.get() + by;
        let mut executed = 0;

        loop {
            // The queue must not stay borrowed while a task runs.
            let next = {
                let mut queue = self.queue.borrow_mut();
                match queue.keys().next().copied() {
                    Some(key) if key.0 <= target => queue.remove(&key).map(|task| (key, task)),
                    _ => None,
                }
            };
            let Some(((due, seq), task)) = next else {
                break;
            };

            self.now.set(due);
            trace!(task = seq, "running task");
            executed += 1;
            task()?;
        }

        self.now.set(target);
        Ok(executed)
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Due time of the earliest pending task
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.borrow().keys().next().map(|(due, _)| *due)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}
