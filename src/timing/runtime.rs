//! Tokio-backed scheduler.
//!
//! Tasks are spawned with `tokio::task::spawn_local`, so the scheduler must be
//! used from inside a `tokio::task::LocalSet`. Cancellation aborts the task;
//! an aborted task is never polled again.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::timing::scheduler::{Scheduler, Task, TimerId};

#[derive(Default)]
struct Registry {
    next_id: u64,
    tasks: HashMap<TimerId, AbortHandle>,
}

/// Production scheduler running each task as its own local Tokio task.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    inner: Rc<RefCell<Registry>>,
}

impl TokioScheduler {
    /// Create a new scheduler. Must be driven by a `LocalSet`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks spawned and not yet finished or canceled.
    pub fn pending(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    fn spawn(&self, delay: Option<Duration>, task: Task) -> TimerId {
        let id = {
            let mut registry = self.inner.borrow_mut();
            registry.next_id += 1;
            TimerId::from_raw(registry.next_id)
        };

        let registry: Weak<RefCell<Registry>> = Rc::downgrade(&self.inner);
        let handle = tokio::task::spawn_local(async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().tasks.remove(&id);
            }
            task();
        });

        self.inner
            .borrow_mut()
            .tasks
            .insert(id, handle.abort_handle());
        id
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        self.spawn(Some(delay), task)
    }

    fn defer(&self, task: Task) -> TimerId {
        self.spawn(None, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        let handle = self.inner.borrow_mut().tasks.remove(&id);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn scheduled_task_runs_after_delay() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let ran = Rc::new(Cell::new(false));
                let flag = Rc::clone(&ran);
                scheduler.schedule(Duration::from_millis(5), Box::new(move || flag.set(true)));
                assert_eq!(scheduler.pending(), 1);

                tokio::time::sleep(Duration::from_millis(50)).await;
                assert!(ran.get());
                assert_eq!(scheduler.pending(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn canceled_task_never_runs() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let ran = Rc::new(Cell::new(false));
                let flag = Rc::clone(&ran);
                let id = scheduler.defer(Box::new(move || flag.set(true)));

                assert!(scheduler.cancel(id));
                assert!(!scheduler.cancel(id));

                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(!ran.get());
            })
            .await;
    }
}
