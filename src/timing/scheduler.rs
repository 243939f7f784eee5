//! Clock/scheduler abstraction.

use std::fmt;
use std::time::Duration;

/// A unit of work run by a scheduler in its own turn.
pub type Task = Box<dyn FnOnce()>;

/// Identifier of a scheduled task, unique per scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Wrap a raw identifier. Schedulers hand these out monotonically.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Timer creation and cancellation.
///
/// Implementations run every task as a discrete turn: a task is never invoked
/// from inside `schedule`, `defer` or `cancel`.
pub trait Scheduler {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Run `task` in the next scheduling quantum, after whatever is already
    /// queued for the current one.
    fn defer(&self, task: Task) -> TimerId;

    /// Cancel a scheduled or deferred task.
    ///
    /// Returns `false` if the task already ran or was never known.
    fn cancel(&self, id: TimerId) -> bool;
}
