//! Listener registry shared by every event source.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for listener IDs.
/// Relaxed ordering is enough since only uniqueness matters.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A handler invoked for every event a source emits.
pub type Listener<E> = Rc<dyn Fn(&E)>;

/// Something listeners can subscribe to.
pub trait EventSource<E> {
    /// Register `listener`; it stays registered until unsubscribed.
    fn subscribe(&self, listener: Listener<E>) -> ListenerId;

    /// Remove one listener. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Single-threaded listener registry.
///
/// Emission iterates over a snapshot, so listeners may subscribe or
/// unsubscribe while an event is being delivered. A listener removed during
/// delivery is not called for the remainder of that delivery.
pub struct Emitter<E> {
    listeners: RefCell<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Deliver `event` to every listener. Returns how many were called.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<(ListenerId, Listener<E>)> = self.listeners.borrow().clone();
        let mut delivered = 0;
        for (id, listener) in snapshot {
            if !self.contains(id) {
                continue;
            }
            listener(event);
            delivered += 1;
        }
        delivered
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|(registered, _)| *registered == id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl<E> EventSource<E> for Emitter<E> {
    fn subscribe(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            listeners
                .iter()
                .position(|(registered, _)| *registered == id)
                .map(|index| listeners.remove(index))
        };
        removed.is_some()
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn listener_ids_are_unique() {
        assert_ne!(ListenerId::new(), ListenerId::new());
    }

    #[test]
    fn emit_reaches_every_listener_until_unsubscribed() {
        let emitter: Emitter<u32> = Emitter::new();
        let total = Rc::new(Cell::new(0));

        let a = Rc::clone(&total);
        let first = emitter.subscribe(Rc::new(move |v: &u32| a.set(a.get() + v)));
        let b = Rc::clone(&total);
        emitter.subscribe(Rc::new(move |v: &u32| b.set(b.get() + v * 10)));

        assert_eq!(emitter.emit(&1), 2);
        assert_eq!(total.get(), 11);

        assert!(emitter.unsubscribe(first));
        assert!(!emitter.unsubscribe(first));
        assert_eq!(emitter.emit(&1), 1);
        assert_eq!(total.get(), 21);
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn listener_removed_mid_delivery_is_skipped() {
        let emitter: Rc<Emitter<()>> = Rc::new(Emitter::new());
        let second_called = Rc::new(Cell::new(false));
        let victim = Rc::new(Cell::new(None));

        let source = Rc::clone(&emitter);
        let target = Rc::clone(&victim);
        emitter.subscribe(Rc::new(move |_: &()| {
            if let Some(id) = target.get() {
                source.unsubscribe(id);
            }
        }));
        let flag = Rc::clone(&second_called);
        let id = emitter.subscribe(Rc::new(move |_: &()| flag.set(true)));
        victim.set(Some(id));

        assert_eq!(emitter.emit(&()), 1);
        assert!(!second_called.get());
    }
}
