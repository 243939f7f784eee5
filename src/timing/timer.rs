//! Phase timers with deferred firing.
//!
//! A timer has two stages: the primary deadline, and on elapse a deferred
//! invocation queued for the next scheduling quantum. Canceling clears
//! whichever stage is live. The callback runs at most once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::phase::Phase;
use crate::timing::scheduler::{Scheduler, TimerId};

/// Lifecycle of a phase timer. `Fired` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Armed; the callback may still run.
    Pending,
    /// The callback ran.
    Fired,
    /// Canceled before the callback ran.
    Canceled,
}

type BreachCallback = Box<dyn FnOnce(Phase, u64)>;

struct TimerInner {
    label: Phase,
    threshold_ms: u64,
    state: Cell<TimerState>,
    primary: Cell<Option<TimerId>>,
    deferred: Cell<Option<TimerId>>,
    callback: RefCell<Option<BreachCallback>>,
    scheduler: Rc<dyn Scheduler>,
}

impl TimerInner {
    fn on_elapsed(self: &Rc<Self>) {
        self.primary.set(None);
        if self.state.get() != TimerState::Pending {
            return;
        }
        let timer = Rc::clone(self);
        let id = self.scheduler.defer(Box::new(move || timer.fire()));
        self.deferred.set(Some(id));
    }

    fn fire(&self) {
        self.deferred.set(None);
        if self.state.get() != TimerState::Pending {
            return;
        }
        self.state.set(TimerState::Fired);
        let callback = self.callback.borrow_mut().take();
        if let Some(callback) = callback {
            callback(self.label, self.threshold_ms);
        }
    }
}

/// A single armed deadline bound to a phase.
pub struct PhaseTimer {
    inner: Rc<TimerInner>,
}

/// Arm a deadline of `threshold_ms` for `label`.
///
/// On elapse `callback` is deferred to the next scheduling quantum rather
/// than invoked inline, so a cancellation delivered in the same turn as the
/// elapse is observed first.
pub fn add_timeout<F>(
    scheduler: &Rc<dyn Scheduler>,
    label: Phase,
    threshold_ms: u64,
    callback: F,
) -> PhaseTimer
where
    F: FnOnce(Phase, u64) + 'static,
{
    let inner = Rc::new(TimerInner {
        label,
        threshold_ms,
        state: Cell::new(TimerState::Pending),
        primary: Cell::new(None),
        deferred: Cell::new(None),
        callback: RefCell::new(Some(Box::new(callback))),
        scheduler: Rc::clone(scheduler),
    });

    let timer = Rc::clone(&inner);
    let id = scheduler.schedule(
        Duration::from_millis(threshold_ms),
        Box::new(move || timer.on_elapsed()),
    );
    inner.primary.set(Some(id));

    PhaseTimer { inner }
}

impl PhaseTimer {
    /// Cancel the timer. Returns `false` if it already fired or was canceled.
    pub fn cancel(&self) -> bool {
        if self.inner.state.get() != TimerState::Pending {
            return false;
        }
        self.inner.state.set(TimerState::Canceled);

        if let Some(id) = self.inner.primary.take() {
            self.inner.scheduler.cancel(id);
        }
        if let Some(id) = self.inner.deferred.take() {
            self.inner.scheduler.cancel(id);
        }

        // Release whatever the callback captured.
        let callback = self.inner.callback.borrow_mut().take();
        drop(callback);
        true
    }

    pub fn label(&self) -> Phase {
        self.inner.label
    }

    pub fn threshold_ms(&self) -> u64 {
        self.inner.threshold_ms
    }

    pub fn state(&self) -> TimerState {
        self.inner.state.get()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TimerState::Pending
    }
}

impl fmt::Debug for PhaseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseTimer")
            .field("label", &self.inner.label)
            .field("threshold_ms", &self.inner.threshold_ms)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ManualScheduler;

    fn setup() -> (Rc<ManualScheduler>, Rc<dyn Scheduler>) {
        let manual = Rc::new(ManualScheduler::new());
        let scheduler: Rc<dyn Scheduler> = manual.clone();
        (manual, scheduler)
    }

    #[test]
    fn fires_once_after_deadline() {
        let (clock, scheduler) = setup();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&fired);
        let timer = add_timeout(&scheduler, Phase::Lookup, 10, move |phase, ms| {
            sink.borrow_mut().push((phase, ms));
        });

        clock.advance(Duration::from_millis(9));
        assert!(timer.is_pending());

        clock.advance(Duration::from_millis(1));
        assert_eq!(timer.state(), TimerState::Fired);
        assert_eq!(*fired.borrow(), vec![(Phase::Lookup, 10)]);

        assert!(!timer.cancel());
        assert_eq!(timer.state(), TimerState::Fired);
    }

    #[test]
    fn cancel_in_same_tick_as_elapse_wins() {
        let (clock, scheduler) = setup();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let timer = Rc::new(add_timeout(&scheduler, Phase::Connect, 5, move |_, _| {
            flag.set(true)
        }));

        // A completion signal due at exactly the same instant, queued after
        // the timer's own deadline.
        let completion = Rc::clone(&timer);
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                completion.cancel();
            }),
        );

        clock.advance(Duration::from_millis(5));
        assert!(!fired.get());
        assert_eq!(timer.state(), TimerState::Canceled);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn cancel_clears_primary_deadline() {
        let (clock, scheduler) = setup();
        let timer = add_timeout(&scheduler, Phase::Request, 100, |_, _| {
            panic!("canceled timer must not fire")
        });
        assert_eq!(clock.pending(), 1);

        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert_eq!(clock.pending(), 0);
        clock.advance(Duration::from_millis(200));
    }

    #[test]
    fn zero_threshold_still_defers() {
        let (clock, scheduler) = setup();
        let timer = add_timeout(&scheduler, Phase::SecureConnect, 0, |_, _| {});
        assert_eq!(timer.threshold_ms(), 0);
        assert_eq!(timer.label(), Phase::SecureConnect);

        clock.advance(Duration::ZERO);
        assert_eq!(timer.state(), TimerState::Fired);
        assert_eq!(clock.deferred_total(), 1);
    }
}
