//! Deterministic scheduler driven by a virtual clock.
//!
//! Time only moves when the owner calls [`ManualScheduler::advance`]. Each
//! advance is processed as a series of ticks: all timers due at the tick run
//! first, one turn each, then the deferred queue for that tick is drained.
//! Work deferred while draining lands in the following quantum.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use crate::timing::scheduler::{Scheduler, Task, TimerId};

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<(Duration, TimerId), Task>,
    deadlines: HashMap<TimerId, Duration>,
    deferred: VecDeque<(TimerId, Task)>,
    scheduled_total: usize,
    deferred_total: usize,
}

impl ManualState {
    fn allocate(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId::from_raw(self.next_id)
    }

    /// Pop the first timer due at `tick` that existed before the tick began.
    fn pop_due(&mut self, tick: Duration, horizon: TimerId) -> Option<Task> {
        let key = self
            .timers
            .range(..=(tick, horizon))
            .map(|(key, _)| *key)
            .find(|(_, id)| *id < horizon)?;
        self.deadlines.remove(&key.1);
        self.timers.remove(&key)
    }
}

/// A scheduler whose clock is advanced explicitly.
#[derive(Default)]
pub struct ManualScheduler {
    inner: RefCell<ManualState>,
}

impl ManualScheduler {
    /// Create a scheduler at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    /// Number of timers and deferred tasks not yet run or canceled.
    pub fn pending(&self) -> usize {
        let state = self.inner.borrow();
        state.timers.len() + state.deferred.len()
    }

    /// Total number of `schedule` calls ever made.
    pub fn scheduled_total(&self) -> usize {
        self.inner.borrow().scheduled_total
    }

    /// Total number of `defer` calls ever made.
    pub fn deferred_total(&self) -> usize {
        self.inner.borrow().deferred_total
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.borrow().timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Move the clock forward by `by`, running everything that becomes due.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        self.advance_to(target);
    }

    /// Move the clock to `target`, running everything that becomes due.
    pub fn advance_to(&self, target: Duration) {
        loop {
            let tick = {
                let mut state = self.inner.borrow_mut();
                match state.timers.keys().next() {
                    Some((deadline, _)) if *deadline <= target => {
                        let deadline = *deadline;
                        state.now = state.now.max(deadline);
                        Some((state.now, TimerId::from_raw(state.next_id + 1)))
                    }
                    _ => None,
                }
            };

            let Some((tick, horizon)) = tick else {
                break;
            };

            loop {
                let task = self.inner.borrow_mut().pop_due(tick, horizon);
                match task {
                    Some(task) => task(),
                    None => break,
                }
            }
            self.run_deferred();
        }

        while self.run_deferred() > 0 {}

        let mut state = self.inner.borrow_mut();
        state.now = state.now.max(target);
    }

    /// Run one quantum of deferred work: only tasks queued before the call.
    ///
    /// Returns the number of tasks run.
    pub fn run_deferred(&self) -> usize {
        let queued = self.inner.borrow().deferred.len();
        let mut ran = 0;
        for _ in 0..queued {
            let next = self.inner.borrow_mut().deferred.pop_front();
            match next {
                Some((_, task)) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.inner.borrow_mut();
        let id = state.allocate();
        let deadline = state.now + delay;
        state.timers.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        state.scheduled_total += 1;
        id
    }

    fn defer(&self, task: Task) -> TimerId {
        let mut state = self.inner.borrow_mut();
        let id = state.allocate();
        state.deferred.push_back((id, task));
        state.deferred_total += 1;
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        // Removed tasks are dropped after the borrow is released.
        let removed = {
            let mut state = self.inner.borrow_mut();
            if let Some(deadline) = state.deadlines.remove(&id) {
                state.timers.remove(&(deadline, id))
            } else {
                state
                    .deferred
                    .iter()
                    .position(|(queued, _)| *queued == id)
                    .and_then(|index| state.deferred.remove(index))
                    .map(|(_, task)| task)
            }
        };
        removed.is_some()
    }
}
